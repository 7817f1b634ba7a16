//! Ingestion of spans, traces, logs and metrics.
//!
//! # Data Flow
//! ```text
//! POST /api/v1/{spans,traces,logs,metrics}
//!     → payload.rs (deserialize; one record or a batch)
//!     → processor.rs
//!         → propagation::extract (caller's trace context)
//!         → validate and build model entities
//!         → Storage::save_* (batches and grouped writes are atomic)
//!     → IngestReceipt (trace id, context injected on the response)
//! ```
//!
//! # Design Decisions
//! - Validation happens before anything reaches storage
//! - A span without a trace id joins the caller's trace, else a new one

pub mod error;
pub mod payload;
pub mod processor;

pub use error::IngestError;
pub use processor::{IngestReceipt, IngestionProcessor};
