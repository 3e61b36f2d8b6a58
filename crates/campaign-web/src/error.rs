//! Error types for the campaign HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use campaign::{DeliveryError, ErrorClass, IngestError, InvitationError};
use database::DatabaseError;
use thiserror::Error;

/// Errors returned by request handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or unknown bearer token.
    #[error("Unauthorized")]
    Unauthorized,

    /// The campaign belongs to another operator.
    #[error("Campaign {0} belongs to another operator")]
    Forbidden(String),

    /// The request is malformed.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Invitation(#[from] InvitationError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Spooling an upload failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        let class = match self {
            ApiError::Unauthorized => return StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => return StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => return StatusCode::BAD_REQUEST,
            ApiError::Database(DatabaseError::NotFound { .. }) => ErrorClass::NotFound,
            ApiError::Database(_) | ApiError::Io(_) => ErrorClass::Storage,
            ApiError::Ingest(err) => err.class(),
            ApiError::Invitation(err) => err.class(),
            ApiError::Delivery(err) => err.class(),
        };

        match class {
            ErrorClass::Validation => StatusCode::BAD_REQUEST,
            ErrorClass::Permission => StatusCode::FORBIDDEN,
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::Provider => StatusCode::BAD_GATEWAY,
            ErrorClass::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed: {}", message);
        } else {
            tracing::debug!(status = status.as_u16(), "Request rejected: {}", message);
        }

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

/// Result type for handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
