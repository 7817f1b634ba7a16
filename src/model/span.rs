//! Spans: one timed operation within a trace.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids;

/// Outcome of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    #[default]
    Ok,
    Error,
    Canceled,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::Canceled => "CANCELED",
        }
    }

    /// Case-insensitive parse; also accepts "cancelled".
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "ERROR" => Some(Self::Error),
            "CANCELED" | "CANCELLED" => Some(Self::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timestamped set of fields recorded during a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanLog {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

/// A single operation in a distributed trace.
///
/// Owned by whoever is building it until it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    pub trace_id: String,
    /// Empty for root candidates.
    #[serde(default)]
    pub parent_id: String,
    pub name: String,
    pub service: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub is_finished: bool,
    #[serde(default)]
    pub status: SpanStatus,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub logs: Vec<SpanLog>,
    #[serde(default)]
    pub env: String,
    #[serde(default)]
    pub host: String,
}

impl Span {
    /// Start a new span now.
    pub fn new(name: impl Into<String>, service: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            id: ids::new_span_id(),
            trace_id: trace_id.into(),
            parent_id: String::new(),
            name: name.into(),
            service: service.into(),
            start_time: Utc::now(),
            end_time: None,
            duration_ms: 0,
            is_finished: false,
            status: SpanStatus::Ok,
            tags: HashMap::new(),
            logs: Vec::new(),
            env: String::new(),
            host: String::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_empty()
    }

    pub fn set_parent(&mut self, parent_id: impl Into<String>) {
        self.parent_id = parent_id.into();
    }

    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Append a log event stamped now.
    pub fn add_log(&mut self, fields: HashMap<String, String>) {
        self.logs.push(SpanLog {
            timestamp: Utc::now(),
            fields,
        });
    }

    pub fn set_env(&mut self, env: impl Into<String>) {
        self.env = env.into();
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

    pub fn set_status(&mut self, status: SpanStatus) {
        self.status = status;
    }

    /// Mark the span finished now.
    ///
    /// Calling this again recomputes and overwrites the end time and
    /// duration.
    pub fn finish(&mut self) {
        self.finish_at(Utc::now());
    }

    /// Mark the span finished at `end`.
    pub fn finish_at(&mut self, end: DateTime<Utc>) {
        self.end_time = Some(end);
        self.duration_ms = (end - self.start_time).num_milliseconds();
        self.is_finished = true;
    }
}
