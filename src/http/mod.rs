//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, per-route metrics)
//!     → handlers.rs (ingest → IngestionProcessor, queries → Storage)
//!     → websocket.rs (upgrade → stream::serve)
//!     → error.rs (subsystem errors → status + JSON body)
//! ```

pub mod error;
pub mod handlers;
pub mod request;
pub mod server;
pub mod websocket;

pub use error::ApiError;
pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
