//! W3C Trace Context (`traceparent` / `tracestate`).

use crate::propagation::carrier::get_trimmed;
use crate::propagation::{is_hex, is_hex_up_to, Carrier, TraceContext};

pub const TRACEPARENT: &str = "traceparent";
pub const TRACESTATE: &str = "tracestate";

/// Parse `ver-traceid-spanid-flags`.
pub fn extract(carrier: &dyn Carrier) -> Option<TraceContext> {
    let header = get_trimmed(carrier, TRACEPARENT)?;
    let parts: Vec<&str> = header.split('-').collect();
    if parts.len() != 4 {
        return None;
    }
    let (version, trace_id, span_id, flags) = (parts[0], parts[1], parts[2], parts[3]);
    if !is_hex(version, 2) || !is_hex(trace_id, 32) || !is_hex(span_id, 16) || !is_hex(flags, 2) {
        return None;
    }

    Some(TraceContext {
        trace_id: trace_id.to_ascii_lowercase(),
        span_id: span_id.to_ascii_lowercase(),
        parent_span_id: None,
        sampled: flags == "01",
        trace_state: get_trimmed(carrier, TRACESTATE).map(str::to_string),
    })
}

/// Write `traceparent` (and `tracestate` when present).
///
/// Shorter hex IDs (64-bit B3 or Jaeger trace ids) are left-padded with
/// zeros. IDs that are not hex, are too long or are all zeros have no W3C
/// form; nothing is written for them.
pub fn inject(carrier: &mut dyn Carrier, ctx: &TraceContext) {
    if !representable(&ctx.trace_id, 32) || !representable(&ctx.span_id, 16) {
        return;
    }
    let flags = if ctx.sampled { "01" } else { "00" };
    carrier.set(
        TRACEPARENT,
        format!(
            "00-{:0>32}-{:0>16}-{}",
            ctx.trace_id.to_ascii_lowercase(),
            ctx.span_id.to_ascii_lowercase(),
            flags
        ),
    );
    if let Some(state) = &ctx.trace_state {
        carrier.set(TRACESTATE, state.clone());
    }
}

fn representable(id: &str, max: usize) -> bool {
    is_hex_up_to(id, max) && id.bytes().any(|b| b != b'0')
}
