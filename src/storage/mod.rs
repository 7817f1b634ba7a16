//! Storage and query engine.
//!
//! # Data Flow
//! ```text
//! Ingestion
//!     → Storage::save_* (upsert by id; grouped writes in one transaction)
//!     → memory.rs (tables behind one RwLock, optional JSON snapshot)
//!
//! HTTP queries / stream ticks
//!     → params.rs (QueryParams from the query string)
//!     → Storage::query_* (filter → count → order → page)
//!     → aggregate.rs (bucketing, percentiles, rates)
//!     → export.rs (Prometheus text)
//! ```
//!
//! # Design Decisions
//! - One trait at the seam so handlers and stream sessions hold `Arc<dyn Storage>`
//! - Filters are conjunctive and identical for one-shot and streaming queries
//! - Only `query_logs` returns a pagination envelope; metrics and spans
//!   return flat lists for compatibility with existing clients
//! - Errors are typed and never retried here

pub mod aggregate;
pub mod error;
pub mod export;
pub mod memory;
pub mod params;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{HistogramData, LogEntry, MetricEntry, Span, SpanStatus, Trace};

pub use aggregate::{AggregationQuery, MetricAggregation};
pub use error::{ParamError, StorageError};
pub use memory::{MemoryStore, QueryLimits};
pub use params::QueryParams;

/// Paging metadata for `query_logs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total_items: usize,
    pub total_pages: usize,
    pub page_size: usize,
    pub offset: usize,
}

impl Pagination {
    pub fn new(total_items: usize, page_size: usize, offset: usize) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_items.div_ceil(page_size)
        };
        Self {
            total_items,
            total_pages,
            page_size,
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPage {
    pub logs: Vec<LogEntry>,
    pub pagination: Pagination,
}

/// One row of `query_traces`, taken from the trace's root span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub trace_id: String,
    pub root_span_id: String,
    pub name: String,
    pub service: String,
    pub start_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub status: SpanStatus,
    pub span_count: usize,
    pub error_count: usize,
}

/// Row counts per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub logs: usize,
    pub metrics: usize,
    pub histograms: usize,
    pub spans: usize,
    pub traces: usize,
}

/// Persistence and query operations over telemetry.
///
/// Implementations must be safe for concurrent readers and writers.
pub trait Storage: Send + Sync {
    fn save_log(&self, log: &LogEntry) -> Result<(), StorageError>;

    /// Save a batch in one transaction.
    fn save_logs(&self, logs: &[LogEntry]) -> Result<(), StorageError>;

    fn save_metric(&self, metric: &MetricEntry) -> Result<(), StorageError>;

    /// Save a batch in one transaction.
    fn save_metrics(&self, metrics: &[MetricEntry]) -> Result<(), StorageError>;

    /// Save a sample and its histogram detail atomically.
    fn save_histogram_metric(&self, metric: &MetricEntry, histogram: &HistogramData) -> Result<(), StorageError>;

    /// Save a span and create or update its trace record atomically.
    fn save_span(&self, span: &Span) -> Result<(), StorageError>;

    /// Save a batch of spans and their trace records in one transaction.
    ///
    /// A trace first seen in this batch takes its first empty-parent span as
    /// root, else its first submitted span.
    fn save_spans(&self, spans: &[Span]) -> Result<(), StorageError>;

    /// Save a trace record and all its spans atomically.
    fn save_trace(&self, trace: &Trace) -> Result<(), StorageError>;

    fn query_logs(&self, params: &QueryParams) -> Result<LogPage, StorageError>;

    fn query_metrics(&self, params: &QueryParams) -> Result<Vec<MetricEntry>, StorageError>;

    fn query_spans(&self, params: &QueryParams) -> Result<Vec<Span>, StorageError>;

    fn query_traces(&self, params: &QueryParams) -> Result<Vec<TraceSummary>, StorageError>;

    fn get_trace(&self, trace_id: &str) -> Result<Option<Trace>, StorageError>;

    /// Sorted, distinct service names across logs, metrics and spans.
    fn get_services(&self) -> Result<Vec<String>, StorageError>;

    /// Sorted, distinct metric names.
    fn get_metric_names(&self) -> Result<Vec<String>, StorageError>;

    fn aggregate_metrics(&self, query: &AggregationQuery) -> Result<MetricAggregation, StorageError>;

    fn histogram(&self, metric_id: &str) -> Result<Option<HistogramData>, StorageError>;

    fn stats(&self) -> Result<StoreStats, StorageError>;

    /// Remove every record.
    fn clear_all(&self) -> Result<(), StorageError>;

    /// Persist to durable storage, if the implementation has any.
    fn flush(&self) -> Result<(), StorageError>;

    /// Reject all further operations.
    fn close(&self);
}
