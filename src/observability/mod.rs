//! Observability of Pulse itself.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing macros (structured log events, request ID in the span)
//!     → metrics.rs helpers (counters, gauges, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stderr, pretty or JSON)
//!     → Prometheus exporter on its own listener
//! ```
//!
//! # Design Decisions
//! - Metric names are centralised in metrics.rs; call sites use helpers
//! - The exporter is optional; recording without it is a no-op

pub mod logging;
pub mod metrics;
