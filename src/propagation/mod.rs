//! Distributed trace-context propagation.
//!
//! # Data Flow
//! ```text
//! Inbound request headers
//!     → carrier.rs (case-insensitive header access)
//!     → extract(): w3c.rs → b3.rs → jaeger.rs → custom.rs (first hit wins)
//!     → Option<TraceContext>
//!
//! Outbound headers
//!     → inject(): every encoding is written at once
//! ```
//!
//! # Design Decisions
//! - Each format is a pure `fn(&dyn Carrier) -> Option<TraceContext>`
//! - A malformed header is the same as a missing one; extraction never fails
//! - Injection fans out to all formats so the next hop can read any of them

pub mod b3;
pub mod carrier;
pub mod context;
pub mod custom;
pub mod jaeger;
pub mod w3c;

pub use carrier::Carrier;
pub use context::TraceContext;

/// A single-format trace-context parser.
pub type Parser = fn(&dyn Carrier) -> Option<TraceContext>;

/// Formats in extraction priority order.
pub const PARSERS: [(&str, Parser); 4] = [
    ("w3c", w3c::extract),
    ("b3", b3::extract),
    ("jaeger", jaeger::extract),
    ("custom", custom::extract),
];

/// Extract a trace context from the carrier, trying each format in order.
///
/// Returns `None` when no format parses; the caller then originates a new
/// root trace.
pub fn extract(carrier: &dyn Carrier) -> Option<TraceContext> {
    for (format, parse) in PARSERS.iter() {
        if let Some(ctx) = parse(carrier) {
            tracing::trace!(format = %format, trace_id = %ctx.trace_id, "Trace context extracted");
            return Some(ctx);
        }
    }
    None
}

/// Write `ctx` into the carrier in all supported encodings.
pub fn inject(carrier: &mut dyn Carrier, ctx: &TraceContext) {
    w3c::inject(carrier, ctx);
    b3::inject(carrier, ctx);
    jaeger::inject(carrier, ctx);
    custom::inject(carrier, ctx);
}

/// True if `s` is exactly `len` lowercase-or-uppercase hex digits.
pub(crate) fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// True if `s` is a non-empty hex string of at most `max` digits.
pub(crate) fn is_hex_up_to(s: &str, max: usize) -> bool {
    !s.is_empty() && s.len() <= max && s.bytes().all(|b| b.is_ascii_hexdigit())
}
