//! Storage errors for the campaign store.

use thiserror::Error;

/// Errors from the campaign store.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("sqlite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A JSON column (contact fields, template sections) could not be encoded or decoded.
    #[error("json column error: {0}")]
    Json(#[from] serde_json::Error),

    /// No row with this key.
    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: String },

    /// A message with this provider message id is already logged.
    #[error("provider message {provider_sid} is already logged")]
    DuplicateMessage { provider_sid: String },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
