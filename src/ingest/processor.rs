//! Turns validated submissions into stored entities.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;

use crate::ingest::error::IngestError;
use crate::ingest::payload::{
    LogPayload, LogSubmission, MetricPayload, MetricSubmission, SpanPayload, SpanSubmission, TracePayload,
};
use crate::model::{ids, HistogramData, LogEntry, LogLevel, MetricEntry, MetricType, Span, SpanStatus, Trace};
use crate::observability::metrics;
use crate::propagation::{self, Carrier, TraceContext};
use crate::storage::Storage;

/// Result of one accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReceipt {
    pub accepted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Context to propagate on the response, if any.
    #[serde(skip)]
    pub context: Option<TraceContext>,
}

impl IngestReceipt {
    /// Write the response context into `carrier` in every encoding.
    pub fn inject_into(&self, carrier: &mut dyn Carrier) {
        if let Some(ctx) = &self.context {
            propagation::inject(carrier, ctx);
        }
    }
}

pub struct IngestionProcessor {
    store: Arc<dyn Storage>,
}

impl IngestionProcessor {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    /// Ingest one span or a batch of spans.
    ///
    /// Spans without a trace id join the caller's trace; with no caller
    /// context the whole batch joins one newly originated trace.
    pub fn ingest_spans(&self, headers: &dyn Carrier, body: &[u8]) -> Result<IngestReceipt, IngestError> {
        let payloads = serde_json::from_slice::<SpanSubmission>(body)?.into_vec();
        if payloads.is_empty() {
            return Err(IngestError::validation("no spans submitted"));
        }

        let ctx = propagation::extract(headers);
        let originated = ids::new_trace_id();
        let spans = payloads
            .into_iter()
            .map(|p| build_span(p, ctx.as_ref(), &originated, true))
            .collect::<Result<Vec<_>, _>>()?;

        self.store.save_spans(&spans)?;
        metrics::record_ingested("spans", spans.len());

        let caller_span = ctx.as_ref().map(|c| c.span_id.as_str());
        let Some(lead) = spans
            .iter()
            .find(|s| s.is_root() || Some(s.parent_id.as_str()) == caller_span)
            .or_else(|| spans.first())
        else {
            return Err(IngestError::validation("no spans submitted"));
        };
        tracing::debug!(trace_id = %lead.trace_id, count = spans.len(), "Spans ingested");

        Ok(IngestReceipt {
            accepted: spans.len(),
            trace_id: Some(lead.trace_id.clone()),
            context: Some(response_context(lead, ctx.as_ref())),
        })
    }

    /// Ingest a complete trace, inferring its root.
    pub fn ingest_trace(&self, headers: &dyn Carrier, body: &[u8]) -> Result<IngestReceipt, IngestError> {
        let payload: TracePayload = serde_json::from_slice(body)?;
        if payload.spans.is_empty() {
            return Err(IngestError::validation("a trace requires at least one span"));
        }
        let status = payload.status.as_deref().map(parse_status).transpose()?;

        let ctx = propagation::extract(headers);
        let originated = ids::new_trace_id();
        let spans = payload
            .spans
            .into_iter()
            .map(|p| build_span(p, ctx.as_ref(), &originated, false))
            .collect::<Result<Vec<_>, _>>()?;

        let Some(mut trace) = Trace::from_spans(spans) else {
            return Err(IngestError::validation("a trace requires at least one span"));
        };
        trace.status = status;
        if let Some(ctx) = ctx.as_ref().filter(|c| c.trace_id == trace.id) {
            if let Some(root) = trace.root_mut().filter(|r| r.is_root()) {
                root.set_parent(ctx.span_id.clone());
            }
        }

        self.store.save_trace(&trace)?;
        metrics::record_ingested("spans", trace.spans.len());

        let root = trace
            .root()
            .ok_or_else(|| IngestError::validation("trace root missing"))?;
        tracing::debug!(trace_id = %trace.id, spans = trace.spans.len(), root = %root.id, "Trace ingested");

        Ok(IngestReceipt {
            accepted: trace.spans.len(),
            trace_id: Some(trace.id.clone()),
            context: Some(response_context(root, ctx.as_ref())),
        })
    }

    /// Ingest one log or `{"logs": [...]}` as a single transaction.
    pub fn ingest_logs(&self, headers: &dyn Carrier, body: &[u8]) -> Result<IngestReceipt, IngestError> {
        let payloads = serde_json::from_slice::<LogSubmission>(body)?.into_vec();
        if payloads.is_empty() {
            return Err(IngestError::validation("no logs submitted"));
        }
        let ctx = propagation::extract(headers);
        let logs = payloads
            .into_iter()
            .map(|p| build_log(p, ctx.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        self.store.save_logs(&logs)?;
        metrics::record_ingested("logs", logs.len());

        Ok(IngestReceipt {
            accepted: logs.len(),
            trace_id: ctx.as_ref().map(|c| c.trace_id.clone()),
            context: ctx,
        })
    }

    /// Ingest metric samples. Samples with histogram detail are saved
    /// together with it; plain samples are saved as one batch.
    pub fn ingest_metrics(&self, headers: &dyn Carrier, body: &[u8]) -> Result<IngestReceipt, IngestError> {
        let payloads = serde_json::from_slice::<MetricSubmission>(body)?.into_vec();
        if payloads.is_empty() {
            return Err(IngestError::validation("no metrics submitted"));
        }
        let ctx = propagation::extract(headers);
        let built = payloads
            .into_iter()
            .map(|p| build_metric(p, ctx.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let accepted = built.len();

        let mut plain = Vec::new();
        for (metric, histogram) in built {
            match histogram {
                Some(histogram) => self.store.save_histogram_metric(&metric, &histogram)?,
                None => plain.push(metric),
            }
        }
        if !plain.is_empty() {
            self.store.save_metrics(&plain)?;
        }
        metrics::record_ingested("metrics", accepted);

        Ok(IngestReceipt {
            accepted,
            trace_id: ctx.as_ref().map(|c| c.trace_id.clone()),
            context: ctx,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_status(value: &str) -> Result<SpanStatus, IngestError> {
    SpanStatus::parse(value).ok_or_else(|| IngestError::validation(format!("unknown span status `{value}`")))
}

/// Build a span from its payload.
///
/// `parent_to_caller` attaches root candidates of the caller's trace to the
/// caller's span. Trace submissions pass `false` so root inference still
/// sees them as candidates.
fn build_span(
    payload: SpanPayload,
    ctx: Option<&TraceContext>,
    originated: &str,
    parent_to_caller: bool,
) -> Result<Span, IngestError> {
    if payload.name.trim().is_empty() {
        return Err(IngestError::validation("span name is required"));
    }
    if payload.service.trim().is_empty() {
        return Err(IngestError::validation("span service is required"));
    }

    let trace_id = non_empty(payload.trace_id)
        .or_else(|| ctx.map(|c| c.trace_id.clone()))
        .unwrap_or_else(|| originated.to_string());

    let mut span = Span::new(payload.name, payload.service, trace_id);
    if let Some(id) = non_empty(payload.id) {
        span.id = id;
    }
    if let Some(parent) = non_empty(payload.parent_id) {
        span.set_parent(parent);
    } else if let Some(ctx) = ctx.filter(|c| parent_to_caller && c.trace_id == span.trace_id) {
        span.set_parent(ctx.span_id.clone());
    }
    if let Some(start) = payload.start_time {
        span.start_time = start;
    }
    if let Some(status) = payload.status.as_deref() {
        span.set_status(parse_status(status)?);
    }
    for (key, value) in payload.tags {
        span.add_tag(key, value);
    }
    span.logs = payload.logs;
    if let Some(env) = payload.env {
        span.set_env(env);
    }
    if let Some(host) = payload.host {
        span.set_host(host);
    }

    let end = match (payload.end_time, payload.duration_ms) {
        (Some(end), _) => Some(end),
        (None, Some(ms)) => Some(span.start_time + Duration::milliseconds(ms)),
        (None, None) => None,
    };
    if let Some(end) = end {
        if end < span.start_time {
            return Err(IngestError::validation(format!("span {} ends before it starts", span.id)));
        }
        span.finish_at(end);
    }
    Ok(span)
}

fn build_log(payload: LogPayload, ctx: Option<&TraceContext>) -> Result<LogEntry, IngestError> {
    if payload.service.trim().is_empty() {
        return Err(IngestError::validation("log service is required"));
    }
    if payload.message.is_empty() {
        return Err(IngestError::validation("log message is required"));
    }
    let level = match payload.level.as_deref() {
        Some(level) => LogLevel::parse(level)
            .ok_or_else(|| IngestError::validation(format!("unknown log level `{level}`")))?,
        None => LogLevel::default(),
    };

    let trace_id = non_empty(payload.trace_id).or_else(|| ctx.map(|c| c.trace_id.clone()));
    let span_id = non_empty(payload.span_id).or_else(|| ctx.map(|c| c.span_id.clone()));

    Ok(LogEntry {
        id: non_empty(payload.id).unwrap_or_else(ids::new_record_id),
        timestamp: payload.timestamp.unwrap_or_else(Utc::now),
        service: payload.service,
        level,
        message: payload.message,
        trace_id,
        span_id,
        attributes: payload.attributes,
        env: payload.env,
        host: payload.host,
    })
}

fn build_metric(
    payload: MetricPayload,
    ctx: Option<&TraceContext>,
) -> Result<(MetricEntry, Option<HistogramData>), IngestError> {
    if payload.name.trim().is_empty() {
        return Err(IngestError::validation("metric name is required"));
    }
    let value = payload
        .value
        .or_else(|| payload.histogram.as_ref().map(|h| h.sum))
        .ok_or_else(|| IngestError::validation(format!("metric {} has no value", payload.name)))?;
    let metric_type = payload.metric_type.unwrap_or(if payload.histogram.is_some() {
        MetricType::Histogram
    } else {
        MetricType::Gauge
    });

    let mut labels = payload.labels;
    if let Some(ctx) = ctx {
        labels
            .entry("trace_id".to_string())
            .or_insert_with(|| ctx.trace_id.clone());
    }

    let metric = MetricEntry {
        id: non_empty(payload.id).unwrap_or_else(ids::new_record_id),
        name: payload.name,
        metric_type,
        value,
        timestamp: payload.timestamp.unwrap_or_else(Utc::now),
        service: payload.service,
        labels,
    };
    Ok((metric, payload.histogram))
}

/// Context handed back to the caller: the lead span becomes the current
/// span, the caller's span its parent.
fn response_context(lead: &Span, caller: Option<&TraceContext>) -> TraceContext {
    TraceContext {
        trace_id: lead.trace_id.clone(),
        span_id: lead.id.clone(),
        parent_span_id: caller.map(|c| c.span_id.clone()),
        sampled: caller.map_or(true, |c| c.sampled),
        trace_state: caller.and_then(|c| c.trace_state.clone()),
    }
}
