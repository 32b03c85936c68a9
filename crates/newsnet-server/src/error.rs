//! Error types for the network services

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use newsnet_core::{DistributionError, StorageError};
use newsnet_sync::{ErrorBody, SyncError};

/// Errors raised by the Hub and Node services
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller lacks the required capability
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Route not served by this site's role
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Distribution error: {0}")]
    Distribution(#[from] DistributionError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// HTTP status and machine code of the error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Distribution(DistributionError::Storage(_)) | Self::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
            Self::Distribution(e) => (StatusCode::BAD_REQUEST, e.code()),
            Self::Sync(SyncError::Transport { .. }) => (StatusCode::BAD_GATEWAY, "transport_error"),
            Self::Sync(e) if e.is_rejection() => (StatusCode::BAD_REQUEST, "invalid_event"),
            Self::Sync(_) => (StatusCode::INTERNAL_SERVER_ERROR, "sync_error"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Config(_) | Self::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let body = ErrorBody {
            code: code.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for server operations
pub type ServerResult<T> = Result<T, ServerError>;
