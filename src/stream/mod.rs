//! Real-time streaming to dashboard clients.
//!
//! # Data Flow
//! ```text
//! GET /api/v1/stream/{kind} (WebSocket upgrade)
//!     → registry.rs (register connection, guard deregisters on drop)
//!     → session.rs (initial window, then tumbling windows per tick)
//!         → Storage::query_* with the connection's QueryParams
//!     → envelope.rs ({type, payload, initial} frames)
//!     → connection.rs (reader task + tick loop over the split socket)
//! ```
//!
//! # Design Decisions
//! - Delivery is at-most-once per connection; records that become visible
//!   after their window closed are skipped
//! - Empty batches are never sent
//! - A failed tick query is reported as an `error` envelope and the loop
//!   keeps going
//! - Clients own reconnection and de-duplication

pub mod connection;
pub mod envelope;
pub mod registry;
pub mod session;

pub use connection::{serve, CloseReason};
pub use envelope::{Envelope, EnvelopeType, StreamKind};
pub use registry::{ConnectionId, ConnectionInfo, StreamGuard, StreamRegistry, StreamStats};
pub use session::StreamSession;
