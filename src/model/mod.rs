//! Telemetry entities.
//!
//! # Responsibilities
//! - Span and Trace construction, mutation and root inference
//! - Log and metric records as persisted by the store
//! - Identifier generation
//!
//! # Design Decisions
//! - Entities are plain owned values; mutation goes through `&mut self`
//!   setters so the borrow checker enforces a single writer
//! - All timestamps are UTC
//! - Records are serde types; the JSON shape is the wire shape

pub mod ids;
pub mod log;
pub mod metric;
pub mod span;
pub mod trace;

pub use log::{LogEntry, LogLevel};
pub use metric::{HistogramBucket, HistogramData, MetricEntry, MetricType};
pub use span::{Span, SpanLog, SpanStatus};
pub use trace::Trace;
