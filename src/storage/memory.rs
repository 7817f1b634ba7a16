//! In-memory store with transactional grouped writes and JSON snapshots.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::model::{HistogramData, LogEntry, LogLevel, MetricEntry, Span, SpanStatus, Trace};
use crate::storage::aggregate::{self, AggregationQuery, MetricAggregation};
use crate::storage::{
    LogPage, Pagination, QueryParams, Storage, StorageError, StoreStats, TraceSummary,
};

/// Page size bounds applied to every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    /// Used when a query gives no limit.
    pub default_limit: usize,
    /// Upper bound on any requested limit.
    pub max_limit: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1_000,
        }
    }
}

impl QueryLimits {
    fn page_size(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(0) | None => self.default_limit,
            Some(n) => n.min(self.max_limit),
        }
    }
}

/// Per-trace bookkeeping kept alongside spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TraceRecord {
    id: String,
    /// Empty until a root span is known.
    root_span_id: String,
    /// The root was the first submitted span of a batch with no
    /// empty-parent span; a later empty-parent span replaces it.
    #[serde(default)]
    root_inferred: bool,
    status: Option<SpanStatus>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    logs: HashMap<String, LogEntry>,
    metrics: HashMap<String, MetricEntry>,
    histograms: HashMap<String, HistogramData>,
    spans: HashMap<String, Span>,
    traces: HashMap<String, TraceRecord>,
}

enum WriteOp {
    Log(LogEntry),
    Metric(MetricEntry),
    Histogram(String, HistogramData),
    Span(Span),
    /// Upsert, replacing any previous record.
    Trace(TraceRecord),
    /// Create the record if missing and offer a root for it.
    TouchTrace { id: String, root: String, inferred: bool },
}

/// Writes staged for one atomic apply.
///
/// Every `put_*` validates its record. If the closure driving the
/// transaction returns an error, nothing staged is applied.
#[derive(Default)]
pub struct Transaction {
    ops: Vec<WriteOp>,
}

impl Transaction {
    fn put_log(&mut self, log: &LogEntry) -> Result<(), StorageError> {
        if log.id.is_empty() {
            return Err(StorageError::Invalid("log id is empty".into()));
        }
        self.ops.push(WriteOp::Log(log.clone()));
        Ok(())
    }

    fn put_metric(&mut self, metric: &MetricEntry) -> Result<(), StorageError> {
        if metric.id.is_empty() || metric.name.is_empty() {
            return Err(StorageError::Invalid("metric id and name are required".into()));
        }
        if !metric.value.is_finite() {
            return Err(StorageError::Invalid(format!(
                "metric {} has a non-finite value",
                metric.name
            )));
        }
        self.ops.push(WriteOp::Metric(metric.clone()));
        Ok(())
    }

    fn put_histogram(&mut self, metric_id: &str, histogram: &HistogramData) -> Result<(), StorageError> {
        if histogram.buckets.iter().any(|b| b.upper_bound.is_nan()) {
            return Err(StorageError::Invalid("histogram bucket bound is NaN".into()));
        }
        self.ops
            .push(WriteOp::Histogram(metric_id.to_string(), histogram.clone()));
        Ok(())
    }

    fn put_span(&mut self, span: &Span) -> Result<(), StorageError> {
        if span.id.is_empty() || span.trace_id.is_empty() {
            return Err(StorageError::Invalid("span id and trace id are required".into()));
        }
        self.ops.push(WriteOp::Span(span.clone()));
        Ok(())
    }

    fn put_trace(&mut self, record: TraceRecord) {
        self.ops.push(WriteOp::Trace(record));
    }

    /// Offer one root per trace touched by `spans`: its first empty-parent
    /// span, else its first submitted span.
    fn touch_traces(&mut self, spans: &[Span]) {
        let mut touched: Vec<&str> = Vec::new();
        for span in spans {
            if touched.contains(&span.trace_id.as_str()) {
                continue;
            }
            touched.push(&span.trace_id);
            let declared = spans
                .iter()
                .find(|s| s.trace_id == span.trace_id && s.is_root());
            self.ops.push(WriteOp::TouchTrace {
                id: span.trace_id.clone(),
                root: declared.unwrap_or(span).id.clone(),
                inferred: declared.is_none(),
            });
        }
    }

    fn apply(self, tables: &mut Tables) {
        for op in self.ops {
            match op {
                WriteOp::Log(log) => {
                    tables.logs.insert(log.id.clone(), log);
                }
                WriteOp::Metric(metric) => {
                    tables.metrics.insert(metric.id.clone(), metric);
                }
                WriteOp::Histogram(id, histogram) => {
                    tables.histograms.insert(id, histogram);
                }
                WriteOp::Span(span) => {
                    tables.spans.insert(span.id.clone(), span);
                }
                WriteOp::Trace(record) => {
                    tables.traces.insert(record.id.clone(), record);
                }
                WriteOp::TouchTrace { id, root, inferred } => {
                    let record = tables.traces.entry(id.clone()).or_insert(TraceRecord {
                        id,
                        root_span_id: String::new(),
                        root_inferred: false,
                        status: None,
                    });
                    if record.root_span_id.is_empty() || (record.root_inferred && !inferred) {
                        record.root_span_id = root;
                        record.root_inferred = inferred;
                    }
                }
            }
        }
    }
}

/// Thread-safe in-memory implementation of [`Storage`].
pub struct MemoryStore {
    tables: RwLock<Tables>,
    closed: AtomicBool,
    limits: QueryLimits,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Create an empty store with no snapshot file.
    pub fn new(limits: QueryLimits) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            closed: AtomicBool::new(false),
            limits,
            snapshot_path: None,
        }
    }

    /// Open a store backed by a snapshot file, loading it if it exists.
    pub fn open(path: impl AsRef<Path>, limits: QueryLimits) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let tables: Tables = serde_json::from_reader(reader)?;
            tracing::info!(
                path = %path.display(),
                logs = tables.logs.len(),
                metrics = tables.metrics.len(),
                spans = tables.spans.len(),
                "Loaded store snapshot"
            );
            tables
        } else {
            Tables::default()
        };

        Ok(Self {
            tables: RwLock::new(tables),
            closed: AtomicBool::new(false),
            limits,
            snapshot_path: Some(path),
        })
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed.load(AtomicOrdering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.ensure_open()?;
        self.tables
            .read()
            .map_err(|_| StorageError::Read("store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.ensure_open()?;
        self.tables
            .write()
            .map_err(|_| StorageError::Write("store lock poisoned".into()))
    }

    /// Stage writes with `f`, then apply them all under one write lock.
    ///
    /// If `f` fails the staged writes are dropped and the store is untouched.
    pub fn transaction<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Transaction) -> Result<(), StorageError>,
    {
        self.ensure_open()?;
        let mut tx = Transaction::default();
        if let Err(e) = f(&mut tx) {
            tracing::debug!(error = %e, staged = tx.ops.len(), "Transaction rolled back");
            return Err(e);
        }
        let mut tables = self.write()?;
        tx.apply(&mut tables);
        Ok(())
    }
}

fn log_matches(log: &LogEntry, params: &QueryParams) -> bool {
    params.service.as_ref().map_or(true, |s| &log.service == s)
        && params
            .level
            .as_ref()
            .map_or(true, |l| LogLevel::parse(l) == Some(log.level))
        && params
            .trace_id
            .as_ref()
            .map_or(true, |t| log.trace_id.as_ref() == Some(t))
        && params.in_window(log.timestamp)
        && params.search_matches(&[&log.message, &log.service])
        && params.filters_match(&log.attributes)
}

/// Metrics have no severity, so `level` does not apply. `trace_id` matches
/// a `trace_id` label.
fn metric_matches(metric: &MetricEntry, params: &QueryParams) -> bool {
    params.service.as_ref().map_or(true, |s| &metric.service == s)
        && params
            .trace_id
            .as_ref()
            .map_or(true, |t| metric.labels.get("trace_id") == Some(t))
        && params.in_window(metric.timestamp)
        && params.search_matches(&[&metric.name, &metric.service])
        && params.filters_match(&metric.labels)
}

/// For spans `level` matches the span status.
fn span_matches(span: &Span, params: &QueryParams) -> bool {
    params.service.as_ref().map_or(true, |s| &span.service == s)
        && params
            .level
            .as_ref()
            .map_or(true, |l| SpanStatus::parse(l) == Some(span.status))
        && params.trace_id.as_ref().map_or(true, |t| &span.trace_id == t)
        && params.in_window(span.start_time)
        && params.search_matches(&[&span.name, &span.service])
        && params.filters_match(&span.tags)
}

fn directed(ord: Ordering, desc: bool) -> Ordering {
    if desc {
        ord.reverse()
    } else {
        ord
    }
}

fn compare_logs(a: &LogEntry, b: &LogEntry, field: &str) -> Ordering {
    match field {
        "level" => a.level.cmp(&b.level),
        "service" => a.service.cmp(&b.service),
        "message" => a.message.cmp(&b.message),
        _ => a.timestamp.cmp(&b.timestamp),
    }
    .then_with(|| a.id.cmp(&b.id))
}

fn compare_metrics(a: &MetricEntry, b: &MetricEntry, field: &str) -> Ordering {
    match field {
        "name" => a.name.cmp(&b.name),
        "value" => a.value.total_cmp(&b.value),
        "service" => a.service.cmp(&b.service),
        _ => a.timestamp.cmp(&b.timestamp),
    }
    .then_with(|| a.id.cmp(&b.id))
}

fn compare_spans(a: &Span, b: &Span, field: &str) -> Ordering {
    match field {
        "duration" | "duration_ms" => a.duration_ms.cmp(&b.duration_ms),
        "name" => a.name.cmp(&b.name),
        "service" => a.service.cmp(&b.service),
        _ => a.start_time.cmp(&b.start_time),
    }
    .then_with(|| a.id.cmp(&b.id))
}

fn page<T: Clone>(items: Vec<&T>, offset: usize, size: usize) -> Vec<T> {
    items.into_iter().skip(offset).take(size).cloned().collect()
}

impl Storage for MemoryStore {
    fn save_log(&self, log: &LogEntry) -> Result<(), StorageError> {
        self.transaction(|tx| tx.put_log(log))
    }

    fn save_logs(&self, logs: &[LogEntry]) -> Result<(), StorageError> {
        self.transaction(|tx| logs.iter().try_for_each(|log| tx.put_log(log)))
    }

    fn save_metric(&self, metric: &MetricEntry) -> Result<(), StorageError> {
        self.transaction(|tx| tx.put_metric(metric))
    }

    fn save_metrics(&self, metrics: &[MetricEntry]) -> Result<(), StorageError> {
        self.transaction(|tx| metrics.iter().try_for_each(|m| tx.put_metric(m)))
    }

    fn save_histogram_metric(&self, metric: &MetricEntry, histogram: &HistogramData) -> Result<(), StorageError> {
        self.transaction(|tx| {
            tx.put_metric(metric)?;
            tx.put_histogram(&metric.id, histogram)
        })
    }

    fn save_span(&self, span: &Span) -> Result<(), StorageError> {
        self.save_spans(std::slice::from_ref(span))
    }

    fn save_spans(&self, spans: &[Span]) -> Result<(), StorageError> {
        self.transaction(|tx| {
            spans.iter().try_for_each(|span| tx.put_span(span))?;
            tx.touch_traces(spans);
            Ok(())
        })
    }

    fn save_trace(&self, trace: &Trace) -> Result<(), StorageError> {
        if trace.root().is_none() {
            return Err(StorageError::Invalid(format!(
                "trace {} root {} is not one of its spans",
                trace.id, trace.root_id
            )));
        }
        self.transaction(|tx| {
            for span in &trace.spans {
                if span.trace_id != trace.id {
                    return Err(StorageError::Invalid(format!(
                        "span {} belongs to trace {}, not {}",
                        span.id, span.trace_id, trace.id
                    )));
                }
                tx.put_span(span)?;
            }
            tx.put_trace(TraceRecord {
                id: trace.id.clone(),
                root_span_id: trace.root_id.clone(),
                root_inferred: false,
                status: trace.status,
            });
            Ok(())
        })
    }

    fn query_logs(&self, params: &QueryParams) -> Result<LogPage, StorageError> {
        let tables = self.read()?;
        let field = params.order_by.as_deref().unwrap_or("timestamp");
        let mut matched: Vec<&LogEntry> = tables.logs.values().filter(|l| log_matches(l, params)).collect();
        matched.sort_by(|a, b| directed(compare_logs(a, b, field), params.order_desc));

        let page_size = self.limits.page_size(params.limit);
        let pagination = Pagination::new(matched.len(), page_size, params.offset);
        Ok(LogPage {
            logs: page(matched, params.offset, page_size),
            pagination,
        })
    }

    fn query_metrics(&self, params: &QueryParams) -> Result<Vec<MetricEntry>, StorageError> {
        let tables = self.read()?;
        let field = params.order_by.as_deref().unwrap_or("timestamp");
        let mut matched: Vec<&MetricEntry> = tables
            .metrics
            .values()
            .filter(|m| metric_matches(m, params))
            .collect();
        matched.sort_by(|a, b| directed(compare_metrics(a, b, field), params.order_desc));
        Ok(page(matched, params.offset, self.limits.page_size(params.limit)))
    }

    fn query_spans(&self, params: &QueryParams) -> Result<Vec<Span>, StorageError> {
        let tables = self.read()?;
        let field = params.order_by.as_deref().unwrap_or("start_time");
        let mut matched: Vec<&Span> = tables.spans.values().filter(|s| span_matches(s, params)).collect();
        matched.sort_by(|a, b| directed(compare_spans(a, b, field), params.order_desc));
        Ok(page(matched, params.offset, self.limits.page_size(params.limit)))
    }

    fn query_traces(&self, params: &QueryParams) -> Result<Vec<TraceSummary>, StorageError> {
        let tables = self.read()?;

        let mut totals: HashMap<&str, (usize, usize)> = HashMap::new();
        for span in tables.spans.values() {
            let entry = totals.entry(span.trace_id.as_str()).or_default();
            entry.0 += 1;
            if span.status == SpanStatus::Error {
                entry.1 += 1;
            }
        }

        // One representative root per trace: the recorded root if it
        // matched, otherwise the earliest matching root candidate. A
        // recorded root may have a parent in an upstream service.
        let mut representatives: HashMap<&str, &Span> = HashMap::new();
        for span in tables.spans.values() {
            let recorded = tables
                .traces
                .get(&span.trace_id)
                .map(|r| r.root_span_id.as_str());
            let candidate = span.is_root() || recorded == Some(span.id.as_str());
            if !candidate || !span_matches(span, params) {
                continue;
            }
            match representatives.get(span.trace_id.as_str()) {
                Some(current) if recorded == Some(current.id.as_str()) => {}
                Some(current)
                    if recorded != Some(span.id.as_str())
                        && (current.start_time, &current.id) <= (span.start_time, &span.id) => {}
                _ => {
                    representatives.insert(span.trace_id.as_str(), span);
                }
            }
        }

        let mut rows: Vec<TraceSummary> = representatives
            .into_values()
            .map(|root| {
                let (span_count, error_count) = totals.get(root.trace_id.as_str()).copied().unwrap_or((1, 0));
                let status = tables
                    .traces
                    .get(&root.trace_id)
                    .and_then(|r| r.status)
                    .unwrap_or(root.status);
                TraceSummary {
                    trace_id: root.trace_id.clone(),
                    root_span_id: root.id.clone(),
                    name: root.name.clone(),
                    service: root.service.clone(),
                    start_time: root.start_time,
                    duration_ms: root.duration_ms,
                    status,
                    span_count,
                    error_count,
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| a.trace_id.cmp(&b.trace_id))
        });
        Ok(rows
            .into_iter()
            .skip(params.offset)
            .take(self.limits.page_size(params.limit))
            .collect())
    }

    fn get_trace(&self, trace_id: &str) -> Result<Option<Trace>, StorageError> {
        let tables = self.read()?;
        let mut spans: Vec<Span> = tables
            .spans
            .values()
            .filter(|s| s.trace_id == trace_id)
            .cloned()
            .collect();
        if spans.is_empty() {
            return Ok(None);
        }
        spans.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));

        let record = tables.traces.get(trace_id);
        let Some(mut trace) = Trace::from_spans(spans) else {
            return Ok(None);
        };
        if let Some(record) = record {
            if trace.spans.iter().any(|s| s.id == record.root_span_id) {
                trace.root_id = record.root_span_id.clone();
            }
            trace.status = record.status;
        }
        Ok(Some(trace))
    }

    fn get_services(&self) -> Result<Vec<String>, StorageError> {
        let tables = self.read()?;
        let services: BTreeSet<&str> = tables
            .logs
            .values()
            .map(|l| l.service.as_str())
            .chain(tables.metrics.values().map(|m| m.service.as_str()))
            .chain(tables.spans.values().map(|s| s.service.as_str()))
            .filter(|s| !s.is_empty())
            .collect();
        Ok(services.into_iter().map(str::to_string).collect())
    }

    fn get_metric_names(&self) -> Result<Vec<String>, StorageError> {
        let tables = self.read()?;
        let names: BTreeSet<&str> = tables.metrics.values().map(|m| m.name.as_str()).collect();
        Ok(names.into_iter().map(str::to_string).collect())
    }

    fn aggregate_metrics(&self, query: &AggregationQuery) -> Result<MetricAggregation, StorageError> {
        let tables = self.read()?;
        Ok(aggregate::aggregate(tables.metrics.values(), query, Utc::now()))
    }

    fn histogram(&self, metric_id: &str) -> Result<Option<HistogramData>, StorageError> {
        let tables = self.read()?;
        Ok(tables.histograms.get(metric_id).cloned())
    }

    fn stats(&self) -> Result<StoreStats, StorageError> {
        let tables = self.read()?;
        Ok(StoreStats {
            logs: tables.logs.len(),
            metrics: tables.metrics.len(),
            histograms: tables.histograms.len(),
            spans: tables.spans.len(),
            traces: tables.traces.len(),
        })
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        *tables = Tables::default();
        tracing::warn!("All stored telemetry cleared");
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let tables = self.read()?;
        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &*tables)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        tracing::info!(path = %path.display(), "Store snapshot written");
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, AtomicOrdering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HistogramBucket, MetricType};
    use chrono::{DateTime, Duration, TimeZone};
    use std::collections::HashSet;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn log(id: &str, service: &str, level: LogLevel, secs: i64, message: &str) -> LogEntry {
        LogEntry {
            id: id.to_string(),
            timestamp: base() + Duration::seconds(secs),
            service: service.to_string(),
            level,
            message: message.to_string(),
            trace_id: None,
            span_id: None,
            attributes: HashMap::new(),
            env: String::new(),
            host: String::new(),
        }
    }

    fn metric(id: &str, name: &str, secs: i64, value: f64) -> MetricEntry {
        MetricEntry {
            id: id.to_string(),
            name: name.to_string(),
            metric_type: MetricType::Gauge,
            value,
            timestamp: base() + Duration::seconds(secs),
            service: "api".to_string(),
            labels: HashMap::new(),
        }
    }

    fn span_at(name: &str, trace_id: &str, parent: &str, secs: i64) -> Span {
        let mut s = Span::new(name, "svc", trace_id);
        s.set_parent(parent);
        s.start_time = base() + Duration::seconds(secs);
        s
    }

    fn store() -> MemoryStore {
        MemoryStore::new(QueryLimits::default())
    }

    #[test]
    fn test_query_logs_pagination_scenario() {
        let store = store();
        for i in 0..5 {
            store
                .save_log(&log(&format!("l{i}"), "checkout", LogLevel::Info, i, "paid"))
                .unwrap();
        }
        store.save_log(&log("other", "search", LogLevel::Info, 9, "hit")).unwrap();

        let page = store
            .query_logs(&QueryParams {
                service: Some("checkout".into()),
                limit: Some(2),
                offset: 0,
                ..QueryParams::default()
            })
            .unwrap();
        assert_eq!(page.pagination.total_items, 5);
        assert_eq!(page.pagination.total_pages, 3);
        assert_eq!(page.pagination.page_size, 2);
        assert_eq!(page.logs.len(), 2);
        // Newest first by default.
        assert_eq!(page.logs[0].id, "l4");
    }

    #[test]
    fn test_pagination_concatenates_without_gaps() {
        let store = store();
        // Shared timestamps exercise the id tiebreak.
        for i in 0..23 {
            store
                .save_log(&log(&format!("l{i:02}"), "api", LogLevel::Warn, i / 3, "m"))
                .unwrap();
        }
        let params = QueryParams {
            limit: Some(5),
            ..QueryParams::default()
        };
        let total = store.query_logs(&params).unwrap().pagination.total_items;

        let mut paged = Vec::new();
        let mut offset = 0;
        while offset < total {
            let p = QueryParams {
                offset,
                ..params.clone()
            };
            paged.extend(store.query_logs(&p).unwrap().logs.into_iter().map(|l| l.id));
            offset += 5;
        }
        let all: Vec<String> = store
            .query_logs(&QueryParams {
                limit: Some(total),
                ..QueryParams::default()
            })
            .unwrap()
            .logs
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(paged, all);
        assert_eq!(paged.iter().collect::<HashSet<_>>().len(), 23);
    }

    #[test]
    fn test_log_filters_are_conjunctive() {
        let store = store();
        let mut traced = log("a", "api", LogLevel::Error, 0, "db timeout");
        traced.trace_id = Some("t1".into());
        traced.attributes.insert("region".into(), "eu".into());
        store.save_log(&traced).unwrap();
        store.save_log(&log("b", "api", LogLevel::Info, 1, "db timeout")).unwrap();
        store.save_log(&log("c", "web", LogLevel::Error, 2, "timeout")).unwrap();

        let query = |p: QueryParams| -> Vec<String> {
            store.query_logs(&p).unwrap().logs.into_iter().map(|l| l.id).collect()
        };

        assert_eq!(
            query(QueryParams {
                service: Some("api".into()),
                level: Some("error".into()),
                ..QueryParams::default()
            }),
            vec!["a"]
        );
        assert_eq!(
            query(QueryParams {
                trace_id: Some("t1".into()),
                ..QueryParams::default()
            }),
            vec!["a"]
        );
        // Search matches the service name too.
        assert_eq!(
            query(QueryParams {
                search: Some("WEB".into()),
                ..QueryParams::default()
            }),
            vec!["c"]
        );
        assert_eq!(
            query(QueryParams {
                filters: [("region".to_string(), "eu".to_string())].into(),
                ..QueryParams::default()
            }),
            vec!["a"]
        );
        assert_eq!(
            query(QueryParams {
                since: Some(base() + Duration::seconds(1)),
                until: Some(base() + Duration::seconds(2)),
                ..QueryParams::default()
            }),
            vec!["b"]
        );
    }

    #[test]
    fn test_order_by_ascending() {
        let store = store();
        store.save_log(&log("x", "b", LogLevel::Info, 5, "m")).unwrap();
        store.save_log(&log("y", "a", LogLevel::Info, 1, "m")).unwrap();
        let logs = store
            .query_logs(&QueryParams {
                order_by: Some("service".into()),
                order_desc: false,
                ..QueryParams::default()
            })
            .unwrap()
            .logs;
        assert_eq!(logs[0].service, "a");
    }

    #[test]
    fn test_limit_capped() {
        let store = MemoryStore::new(QueryLimits {
            default_limit: 2,
            max_limit: 3,
        });
        for i in 0..5 {
            store.save_log(&log(&format!("l{i}"), "api", LogLevel::Info, i, "m")).unwrap();
        }
        assert_eq!(store.query_logs(&QueryParams::default()).unwrap().logs.len(), 2);
        let page = store
            .query_logs(&QueryParams {
                limit: Some(50),
                ..QueryParams::default()
            })
            .unwrap();
        assert_eq!(page.logs.len(), 3);
        assert_eq!(page.pagination.page_size, 3);
    }

    #[test]
    fn test_span_upsert_is_idempotent() {
        let store = store();
        let mut span = span_at("op", "t1", "", 0);
        store.save_span(&span).unwrap();
        span.name = "renamed".into();
        store.save_span(&span).unwrap();

        let spans = store.query_spans(&QueryParams::default()).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "renamed");
        assert_eq!(store.stats().unwrap().traces, 1);
    }

    #[test]
    fn test_save_trace_and_get() {
        let store = store();
        let a = span_at("A", "t1", "", 0);
        let b = span_at("B", "t1", &a.id, 1);
        let a_id = a.id.clone();
        let trace = Trace::from_spans(vec![b, a]).unwrap();
        store.save_trace(&trace).unwrap();

        let loaded = store.get_trace(&trace.id).unwrap().unwrap();
        assert_eq!(loaded.spans.len(), 2);
        assert_eq!(loaded.root().unwrap().id, a_id);
        assert!(store.get_trace("missing").unwrap().is_none());
    }

    #[test]
    fn test_save_trace_rolls_back_on_invalid_span() {
        let store = store();
        let (mut trace, _) = Trace::new("root", "svc");
        let mut bad = Span::new("bad", "svc", "x");
        bad.id = String::new();
        trace.add_span(bad);

        assert!(store.save_trace(&trace).is_err());
        let stats = store.stats().unwrap();
        assert_eq!(stats.spans, 0);
        assert_eq!(stats.traces, 0);
    }

    #[test]
    fn test_histogram_rolls_back_with_metric() {
        let store = store();
        let m = metric("m1", "latency", 0, 1.0);
        let bad = HistogramData {
            buckets: vec![HistogramBucket { upper_bound: f64::NAN, count: 1 }],
            sum: 0.0,
            count: 1,
        };
        assert!(store.save_histogram_metric(&m, &bad).is_err());
        assert_eq!(store.stats().unwrap().metrics, 0);

        let good = HistogramData {
            buckets: vec![HistogramBucket { upper_bound: 0.1, count: 1 }],
            sum: 0.05,
            count: 1,
        };
        store.save_histogram_metric(&m, &good).unwrap();
        assert_eq!(store.histogram("m1").unwrap(), Some(good));
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let store = store();
        let good = log("ok", "api", LogLevel::Info, 0, "m");
        let bad = log("", "api", LogLevel::Info, 0, "m");
        assert!(store.save_logs(&[good, bad]).is_err());
        assert_eq!(store.stats().unwrap().logs, 0);
    }

    #[test]
    fn test_query_traces_one_row_per_trace() {
        let store = store();
        let root1 = span_at("first", "t1", "", 0);
        let child1 = span_at("child", "t1", &root1.id, 1);
        let root2 = span_at("second", "t2", "", 10);
        let orphan_only = span_at("orphan", "t3", "missing", 20);
        for s in [&root1, &child1, &root2, &orphan_only] {
            store.save_span(s).unwrap();
        }

        let rows = store.query_traces(&QueryParams::default()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].root_span_id, orphan_only.id);
        assert_eq!(rows[1].trace_id, "t2");
        assert_eq!(rows[2].name, "first");
        assert_eq!(rows[2].span_count, 2);

        let limited = store
            .query_traces(&QueryParams {
                limit: Some(1),
                ..QueryParams::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_query_traces_multi_root_uses_recorded_root() {
        let store = store();
        let r1 = span_at("r1", "t1", "", 5);
        let r2 = span_at("r2", "t1", "", 0);
        store.save_span(&r1).unwrap();
        store.save_span(&r2).unwrap();

        let rows = store.query_traces(&QueryParams::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].root_span_id, r1.id);
    }

    #[test]
    fn test_query_traces_lists_recorded_root_with_upstream_parent() {
        let store = store();
        let root = span_at("handler", "t9", "upstream-span", 0);
        let root_id = root.id.clone();
        let mut trace = Trace::from_spans(vec![root]).unwrap();
        trace.root_id = root_id.clone();
        store.save_trace(&trace).unwrap();

        let rows = store.query_traces(&QueryParams::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].root_span_id, root_id);
    }

    #[test]
    fn test_span_parented_upstream_is_listed() {
        let store = store();
        let handler = span_at("GET /users", "t5", "caller-span", 0);
        store.save_spans(std::slice::from_ref(&handler)).unwrap();

        let rows = store.query_traces(&QueryParams::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].root_span_id, handler.id);
        assert_eq!(store.get_trace("t5").unwrap().unwrap().root_id, handler.id);
    }

    #[test]
    fn test_batch_without_root_keeps_first_submitted() {
        let store = store();
        let x = span_at("x", "t6", "p1", 5);
        let y = span_at("y", "t6", "p2", 0);
        store.save_spans(&[x.clone(), y]).unwrap();

        let trace = store.get_trace("t6").unwrap().unwrap();
        assert_eq!(trace.root_id, x.id);
    }

    #[test]
    fn test_declared_root_replaces_inferred() {
        let store = store();
        let child = span_at("child", "t7", "r", 1);
        store.save_span(&child).unwrap();
        let root = span_at("root", "t7", "", 0);
        store.save_span(&root).unwrap();
        let late = span_at("late", "t7", "", 2);
        store.save_span(&late).unwrap();

        assert_eq!(store.get_trace("t7").unwrap().unwrap().root_id, root.id);
    }

    #[test]
    fn test_span_batch_is_all_or_nothing() {
        let store = store();
        let good = span_at("ok", "t8", "", 0);
        let mut bad = span_at("bad", "t8", "", 1);
        bad.trace_id.clear();
        assert!(store.save_spans(&[good, bad]).is_err());
        let stats = store.stats().unwrap();
        assert_eq!(stats.spans, 0);
        assert_eq!(stats.traces, 0);
    }

    #[test]
    fn test_query_metrics_flat() {
        let store = store();
        store.save_metric(&metric("m1", "cpu", 0, 1.0)).unwrap();
        store.save_metric(&metric("m2", "mem", 1, 2.0)).unwrap();
        let all = store.query_metrics(&QueryParams::default()).unwrap();
        assert_eq!(all.len(), 2);
        let cpu = store
            .query_metrics(&QueryParams {
                search: Some("cpu".into()),
                ..QueryParams::default()
            })
            .unwrap();
        assert_eq!(cpu.len(), 1);
        assert_eq!(store.get_metric_names().unwrap(), vec!["cpu", "mem"]);
    }

    #[test]
    fn test_services_sorted_union() {
        let store = store();
        store.save_log(&log("l", "zeta", LogLevel::Info, 0, "m")).unwrap();
        store.save_metric(&metric("m", "cpu", 0, 1.0)).unwrap();
        let mut s = span_at("op", "t1", "", 0);
        s.service = "alpha".into();
        store.save_span(&s).unwrap();
        store.save_log(&log("l2", "api", LogLevel::Info, 0, "m")).unwrap();
        assert_eq!(store.get_services().unwrap(), vec!["alpha", "api", "zeta"]);
    }

    #[test]
    fn test_aggregate_through_store() {
        let store = store();
        let now = Utc::now();
        let mut m = metric("m1", "cpu", 0, 4.0);
        m.timestamp = now - Duration::minutes(5);
        store.save_metric(&m).unwrap();
        let agg = store
            .aggregate_metrics(&AggregationQuery {
                name: "cpu".into(),
                ..AggregationQuery::default()
            })
            .unwrap();
        assert_eq!(agg.time_series.len(), 1);
        assert_eq!(agg.time_series[0].value, 4.0);
    }

    #[test]
    fn test_closed_store_rejects() {
        let store = store();
        store.close();
        assert!(matches!(
            store.save_log(&log("a", "api", LogLevel::Info, 0, "m")),
            Err(StorageError::Closed)
        ));
        assert!(matches!(store.get_services(), Err(StorageError::Closed)));
    }

    #[test]
    fn test_clear_all() {
        let store = store();
        store.save_log(&log("a", "api", LogLevel::Info, 0, "m")).unwrap();
        store.clear_all().unwrap();
        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulse.json");

        let store = MemoryStore::open(&path, QueryLimits::default()).unwrap();
        store.save_log(&log("a", "api", LogLevel::Info, 0, "hello")).unwrap();
        store.save_span(&span_at("op", "t1", "", 0)).unwrap();
        store.flush().unwrap();

        let reopened = MemoryStore::open(&path, QueryLimits::default()).unwrap();
        let stats = reopened.stats().unwrap();
        assert_eq!(stats.logs, 1);
        assert_eq!(stats.spans, 1);
        assert_eq!(stats.traces, 1);
    }
}
