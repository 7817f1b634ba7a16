//! Pulse: an observability backend for logs, metrics and distributed traces.

pub mod admin;
pub mod config;
pub mod http;
pub mod ingest;
pub mod lifecycle;
pub mod model;
pub mod observability;
pub mod propagation;
pub mod storage;
pub mod stream;

pub use config::PulseConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
