//! Mapping of subsystem errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::ingest::IngestError;
use crate::storage::{ParamError, StorageError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{0}")]
    NotFound(String),
}

fn storage_status(e: &StorageError) -> StatusCode {
    match e {
        StorageError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::Invalid(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Param(_) => StatusCode::BAD_REQUEST,
            Self::Ingest(IngestError::Storage(e)) | Self::Storage(e) => storage_status(e),
            Self::Ingest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %message, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %message, "Request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
