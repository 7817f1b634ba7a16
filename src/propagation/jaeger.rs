//! Jaeger `uber-trace-id` propagation.

use crate::propagation::carrier::get_trimmed;
use crate::propagation::{is_hex_up_to, Carrier, TraceContext};

pub const UBER_TRACE_ID: &str = "uber-trace-id";

/// Parse exactly `traceid:spanid:parentid:flags`.
pub fn extract(carrier: &dyn Carrier) -> Option<TraceContext> {
    let header = get_trimmed(carrier, UBER_TRACE_ID)?;
    let parts: Vec<&str> = header.split(':').collect();
    if parts.len() != 4 {
        return None;
    }
    let (trace_id, span_id, parent_id, flags) = (parts[0], parts[1], parts[2], parts[3]);
    if !is_hex_up_to(trace_id, 32) || !is_hex_up_to(span_id, 16) || flags.is_empty() {
        return None;
    }

    // Jaeger writes "0" for "no parent".
    let parent_span_id = match parent_id {
        "" | "0" => None,
        p if is_hex_up_to(p, 16) => Some(p.to_ascii_lowercase()),
        _ => return None,
    };

    Some(TraceContext {
        trace_id: trace_id.to_ascii_lowercase(),
        span_id: span_id.to_ascii_lowercase(),
        parent_span_id,
        sampled: flags == "1" || flags.starts_with('1'),
        trace_state: None,
    })
}

pub fn inject(carrier: &mut dyn Carrier, ctx: &TraceContext) {
    let parent = ctx.parent_span_id.as_deref().unwrap_or("0");
    let flags = if ctx.sampled { "1" } else { "0" };
    carrier.set(
        UBER_TRACE_ID,
        format!("{}:{}:{}:{}", ctx.trace_id, ctx.span_id, parent, flags),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with(value: &str) -> HashMap<String, String> {
        HashMap::from([(UBER_TRACE_ID.to_string(), value.to_string())])
    }

    #[test]
    fn test_extract() {
        let ctx = extract(&with("4bf92f3577b34da6a3ce929d0e0e4736:00f067aa0ba902b7:a2fb4a1d1a96d312:1")).unwrap();
        assert_eq!(ctx.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(ctx.span_id, "00f067aa0ba902b7");
        assert_eq!(ctx.parent_span_id.as_deref(), Some("a2fb4a1d1a96d312"));
        assert!(ctx.sampled);
    }

    #[test]
    fn test_flags_first_char() {
        assert!(extract(&with("abc:def:0:1f")).unwrap().sampled);
        assert!(!extract(&with("abc:def:0:0")).unwrap().sampled);
        assert!(!extract(&with("abc:def:0:2")).unwrap().sampled);
    }

    #[test]
    fn test_zero_parent_is_none() {
        assert!(extract(&with("abc:def:0:1")).unwrap().parent_span_id.is_none());
    }

    #[test]
    fn test_requires_four_fields() {
        assert!(extract(&with("abc:def:1")).is_none());
        assert!(extract(&with("abc:def:0:1:extra")).is_none());
        assert!(extract(&with("xyz:def:0:1")).is_none());
    }
}
