//! Pulse's own fallback headers.

use crate::propagation::carrier::get_trimmed;
use crate::propagation::{Carrier, TraceContext};

pub const TRACE_ID: &str = "x-pulse-trace-id";
pub const SPAN_ID: &str = "x-pulse-span-id";
pub const PARENT_ID: &str = "x-pulse-parent-id";

/// Only the trace id is required. Always sampled.
pub fn extract(carrier: &dyn Carrier) -> Option<TraceContext> {
    let trace_id = get_trimmed(carrier, TRACE_ID)?;
    Some(TraceContext {
        trace_id: trace_id.to_string(),
        span_id: get_trimmed(carrier, SPAN_ID).unwrap_or_default().to_string(),
        parent_span_id: get_trimmed(carrier, PARENT_ID).map(str::to_string),
        sampled: true,
        trace_state: None,
    })
}

pub fn inject(carrier: &mut dyn Carrier, ctx: &TraceContext) {
    carrier.set(TRACE_ID, ctx.trace_id.clone());
    carrier.set(SPAN_ID, ctx.span_id.clone());
    if let Some(parent) = &ctx.parent_span_id {
        carrier.set(PARENT_ID, parent.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_trace_id_only() {
        let c = HashMap::from([(TRACE_ID.to_string(), "my-trace".to_string())]);
        let ctx = extract(&c).unwrap();
        assert_eq!(ctx.trace_id, "my-trace");
        assert_eq!(ctx.span_id, "");
        assert!(ctx.parent_span_id.is_none());
        assert!(ctx.sampled);
    }

    #[test]
    fn test_span_without_trace_is_absent() {
        let c = HashMap::from([(SPAN_ID.to_string(), "s1".to_string())]);
        assert!(extract(&c).is_none());
    }
}
