//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! pulse.toml (optional, --config)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → PulseConfig (validated, immutable)
//!     → handed to subsystems at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ListenerConfig, LogFormat, ObservabilityConfig, PulseConfig, QueryConfig, SecurityConfig, StorageConfig,
    StreamConfig, TimeoutConfig,
};
pub use validation::ValidationError;
