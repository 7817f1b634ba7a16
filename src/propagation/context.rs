//! The propagated trace context.

use serde::{Deserialize, Serialize};

use crate::model::ids;

/// Trace identity carried across a process boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    /// Not representable in W3C `traceparent`.
    pub parent_span_id: Option<String>,
    pub sampled: bool,
    /// Opaque W3C `tracestate`, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_state: Option<String>,
}

impl TraceContext {
    /// A fresh, sampled root context.
    pub fn new_root() -> Self {
        Self {
            trace_id: ids::new_trace_id(),
            span_id: ids::new_span_id(),
            parent_span_id: None,
            sampled: true,
            trace_state: None,
        }
    }

    /// Context for the next hop: same trace, new span, parented to this one.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: ids::new_span_id(),
            parent_span_id: Some(self.span_id.clone()),
            sampled: self.sampled,
            trace_state: self.trace_state.clone(),
        }
    }
}
