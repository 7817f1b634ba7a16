use thiserror::Error;

/// Errors surfaced by the query engine. No error is retried internally.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("store is closed")]
    Closed,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid record: {0}")]
    Invalid(String),
    #[error("failed to write: {0}")]
    Write(String),
    #[error("failed to read: {0}")]
    Read(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from parsing query parameters at the boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("invalid value for `{name}`: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("invalid time `{0}`: expected RFC3339 or a relative duration like 15m")]
    InvalidTime(String),
    #[error("invalid duration `{0}`: expected <number><d|h|m|s>")]
    InvalidDuration(String),
    #[error("unsupported resolution `{0}`")]
    InvalidResolution(String),
}
