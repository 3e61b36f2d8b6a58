//! Error types for sms-gateway.

use thiserror::Error;

/// Provider code for a recipient that blocked the sender or is unreachable.
pub const CODE_RECIPIENT_BLOCKED: i64 = 21614;

/// Provider code for an invalid "To" phone number.
pub const CODE_INVALID_NUMBER: i64 = 21211;

/// Errors that can occur when talking to the SMS provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider rejected the request with an error code.
    #[error("provider error {code} (HTTP {status}): {message}")]
    Api {
        code: i64,
        status: u16,
        message: String,
    },

    /// Scheduled sends need a messaging service and none is configured.
    #[error("scheduled sends require a messaging service sid")]
    SchedulingUnavailable,

    /// The provider answered with something that is not an API response.
    #[error("unexpected provider response: {0}")]
    Unexpected(String),
}

/// Classification of a provider rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The recipient blocked the sender. Permission class.
    RecipientBlocked,
    /// The destination number is not valid. Validation class.
    InvalidNumber,
    /// Anything else, including transport failures.
    Other,
}

impl ErrorKind {
    /// Map a provider error code to its class.
    pub fn from_code(code: i64) -> Self {
        match code {
            CODE_RECIPIENT_BLOCKED => ErrorKind::RecipientBlocked,
            CODE_INVALID_NUMBER => ErrorKind::InvalidNumber,
            _ => ErrorKind::Other,
        }
    }
}

impl ProviderError {
    /// Provider error code, if the provider returned one.
    pub fn code(&self) -> Option<i64> {
        match self {
            ProviderError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        self.code().map_or(ErrorKind::Other, ErrorKind::from_code)
    }
}
