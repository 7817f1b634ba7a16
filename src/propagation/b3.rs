//! Zipkin B3 propagation, single-header and multi-header forms.

use crate::propagation::carrier::get_trimmed;
use crate::propagation::{is_hex_up_to, Carrier, TraceContext};

pub const B3: &str = "b3";
pub const TRACE_ID: &str = "x-b3-traceid";
pub const SPAN_ID: &str = "x-b3-spanid";
pub const PARENT_SPAN_ID: &str = "x-b3-parentspanid";
pub const SAMPLED: &str = "x-b3-sampled";

/// Try the single `b3` header first, then the `x-b3-*` set.
pub fn extract(carrier: &dyn Carrier) -> Option<TraceContext> {
    extract_single(carrier).or_else(|| extract_multi(carrier))
}

fn is_sampling_flag(segment: &str) -> bool {
    matches!(segment, "0" | "1" | "d")
}

fn sampled_from(flag: Option<&str>) -> bool {
    match flag {
        // Absent means the downstream decides; treat as sampled.
        None => true,
        Some(f) => matches!(f, "1" | "d" | "true"),
    }
}

/// `traceid-spanid[-parentid][-sampled]`. A one-character segment is the
/// sampling flag in either position.
fn extract_single(carrier: &dyn Carrier) -> Option<TraceContext> {
    let header = get_trimmed(carrier, B3)?;
    let parts: Vec<&str> = header.split('-').collect();
    if parts.len() < 2 || parts.len() > 4 {
        return None;
    }
    let (trace_id, span_id) = (parts[0], parts[1]);
    if !is_hex_up_to(trace_id, 32) || !is_hex_up_to(span_id, 16) {
        return None;
    }

    let mut parent = None;
    let mut flag = None;
    for segment in &parts[2..] {
        if is_sampling_flag(segment) && flag.is_none() {
            flag = Some(*segment);
        } else if is_hex_up_to(segment, 16) && parent.is_none() {
            parent = Some(segment.to_ascii_lowercase());
        } else {
            return None;
        }
    }

    Some(TraceContext {
        trace_id: trace_id.to_ascii_lowercase(),
        span_id: span_id.to_ascii_lowercase(),
        parent_span_id: parent,
        sampled: sampled_from(flag),
        trace_state: None,
    })
}

fn extract_multi(carrier: &dyn Carrier) -> Option<TraceContext> {
    let trace_id = get_trimmed(carrier, TRACE_ID)?;
    let span_id = get_trimmed(carrier, SPAN_ID)?;
    if !is_hex_up_to(trace_id, 32) || !is_hex_up_to(span_id, 16) {
        return None;
    }
    let parent = get_trimmed(carrier, PARENT_SPAN_ID)
        .filter(|p| is_hex_up_to(p, 16))
        .map(str::to_ascii_lowercase);

    Some(TraceContext {
        trace_id: trace_id.to_ascii_lowercase(),
        span_id: span_id.to_ascii_lowercase(),
        parent_span_id: parent,
        sampled: sampled_from(get_trimmed(carrier, SAMPLED)),
        trace_state: None,
    })
}

/// Write both the single header and the multi-header set.
pub fn inject(carrier: &mut dyn Carrier, ctx: &TraceContext) {
    let flag = if ctx.sampled { "1" } else { "0" };
    let single = match &ctx.parent_span_id {
        Some(parent) => format!("{}-{}-{}-{}", ctx.trace_id, ctx.span_id, parent, flag),
        None => format!("{}-{}-{}", ctx.trace_id, ctx.span_id, flag),
    };
    carrier.set(B3, single);
    carrier.set(TRACE_ID, ctx.trace_id.clone());
    carrier.set(SPAN_ID, ctx.span_id.clone());
    if let Some(parent) = &ctx.parent_span_id {
        carrier.set(PARENT_SPAN_ID, parent.clone());
    }
    carrier.set(SAMPLED, flag.to_string());
}
