//! Traces: the spans sharing one trace id, with a designated root.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids;
use crate::model::span::{Span, SpanStatus};

/// A distributed trace.
///
/// `root_id` always names a member of `spans`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    pub spans: Vec<Span>,
    pub root_id: String,
    /// Explicit status; when unset the root span's status is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SpanStatus>,
}

impl Trace {
    /// Start a new trace with a fresh id and a root span.
    ///
    /// Returns the trace and the root span's id. The trace owns the root;
    /// reach it through [`Trace::root_mut`].
    pub fn new(root_name: impl Into<String>, service: impl Into<String>) -> (Self, String) {
        let id = ids::new_trace_id();
        let root = Span::new(root_name, service, id.clone());
        let root_id = root.id.clone();
        let trace = Self {
            id,
            root_id: root_id.clone(),
            spans: vec![root],
            status: Some(SpanStatus::Ok),
        };
        (trace, root_id)
    }

    /// Build a trace from spans submitted together, inferring the root.
    ///
    /// The first span with an empty parent id is the root. If no span has an
    /// empty parent, the first submitted span is the root. Every span is
    /// moved onto the root's trace id. Returns `None` for an empty input.
    pub fn from_spans(spans: Vec<Span>) -> Option<Self> {
        let root_idx = spans.iter().position(Span::is_root).unwrap_or(0);
        let root = spans.get(root_idx)?;
        let mut trace = Self {
            id: root.trace_id.clone(),
            root_id: root.id.clone(),
            spans: Vec::with_capacity(spans.len()),
            status: None,
        };
        for span in spans {
            trace.add_span(span);
        }
        Some(trace)
    }

    /// Append a span, overwriting its trace id with this trace's id.
    ///
    /// The span's parent id is not checked against existing members.
    pub fn add_span(&mut self, mut span: Span) {
        span.trace_id = self.id.clone();
        self.spans.push(span);
    }

    pub fn root(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.id == self.root_id)
    }

    pub fn root_mut(&mut self) -> Option<&mut Span> {
        let root_id = self.root_id.clone();
        self.spans.iter_mut().find(|s| s.id == root_id)
    }

    /// Explicit status, else the root's.
    pub fn status(&self) -> SpanStatus {
        self.status
            .or_else(|| self.root().map(|r| r.status))
            .unwrap_or_default()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.spans.iter().map(|s| s.start_time).min()
    }

    /// Earliest start to latest end, over finished spans.
    pub fn duration_ms(&self) -> i64 {
        let Some(start) = self.start_time() else {
            return 0;
        };
        self.spans
            .iter()
            .filter_map(|s| s.end_time)
            .max()
            .map(|end| (end - start).num_milliseconds())
            .unwrap_or(0)
    }

    /// Distinct services touched by this trace, sorted.
    pub fn services(&self) -> Vec<String> {
        self.spans
            .iter()
            .map(|s| s.service.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn has_error(&self) -> bool {
        self.spans.iter().any(|s| s.status == SpanStatus::Error)
    }
}
