//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Logging/metrics → Open store → Bind listener
//!
//! Shutdown:
//!     Ctrl+C (signals.rs) → Shutdown::trigger (shutdown.rs)
//!     → server stops accepting and drains
//!     → stream connections send Close and deregister
//!     → store snapshot flushed, store closed
//!
//! Snapshots (snapshot.rs):
//!     Optional periodic flush of the store between startup and shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Ordered shutdown: stop accept, drain, persist

pub mod shutdown;
pub mod signals;
pub mod snapshot;

pub use shutdown::Shutdown;
pub use snapshot::spawn_snapshot_task;
