//! Submission bodies accepted by the ingestion endpoints.
//!
//! Timestamps are RFC3339. Every optional field may be omitted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{HistogramData, MetricType, SpanLog};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpanPayload {
    pub id: Option<String>,
    pub trace_id: Option<String>,
    pub parent_id: Option<String>,
    pub name: String,
    pub service: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Used when `end_time` is absent.
    #[serde(alias = "duration")]
    pub duration_ms: Option<i64>,
    pub status: Option<String>,
    pub tags: HashMap<String, String>,
    pub logs: Vec<SpanLog>,
    pub env: Option<String>,
    pub host: Option<String>,
}

/// `POST /api/v1/spans` accepts one span or `{"spans": [...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SpanSubmission {
    Batch { spans: Vec<SpanPayload> },
    Single(SpanPayload),
}

impl SpanSubmission {
    pub fn into_vec(self) -> Vec<SpanPayload> {
        match self {
            Self::Batch { spans } => spans,
            Self::Single(span) => vec![span],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TracePayload {
    pub spans: Vec<SpanPayload>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogPayload {
    pub id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub service: String,
    pub level: Option<String>,
    pub message: String,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub attributes: HashMap<String, String>,
    pub env: String,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LogSubmission {
    Batch { logs: Vec<LogPayload> },
    Single(LogPayload),
}

impl LogSubmission {
    pub fn into_vec(self) -> Vec<LogPayload> {
        match self {
            Self::Batch { logs } => logs,
            Self::Single(log) => vec![log],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricPayload {
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: Option<MetricType>,
    /// Required unless `histogram` is given, in which case it defaults to
    /// the histogram sum.
    pub value: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub service: String,
    pub labels: HashMap<String, String>,
    pub histogram: Option<HistogramData>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MetricSubmission {
    Batch { metrics: Vec<MetricPayload> },
    Single(MetricPayload),
}

impl MetricSubmission {
    pub fn into_vec(self) -> Vec<MetricPayload> {
        match self {
            Self::Batch { metrics } => metrics,
            Self::Single(metric) => vec![metric],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_or_batch() {
        let one: SpanSubmission = serde_json::from_str(r#"{"name":"op","service":"api"}"#).unwrap();
        assert_eq!(one.into_vec().len(), 1);

        let many: SpanSubmission =
            serde_json::from_str(r#"{"spans":[{"name":"a","service":"s"},{"name":"b","service":"s"}]}"#).unwrap();
        assert_eq!(many.into_vec().len(), 2);
    }

    #[test]
    fn test_duration_alias_and_timestamps() {
        let span: SpanPayload = serde_json::from_str(
            r#"{"name":"op","service":"api","start_time":"2024-05-01T12:00:00Z","duration":125}"#,
        )
        .unwrap();
        assert_eq!(span.duration_ms, Some(125));
        assert!(span.start_time.is_some());
    }

    #[test]
    fn test_metric_type_field() {
        let m: MetricPayload = serde_json::from_str(r#"{"name":"hits","type":"counter","value":3}"#).unwrap();
        assert_eq!(m.metric_type, Some(MetricType::Counter));
        assert!(serde_json::from_str::<MetricPayload>(r#"{"name":"x","type":"bogus"}"#).is_err());
    }
}
