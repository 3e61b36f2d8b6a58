//! Types for sending messages through the provider.

use serde::{Deserialize, Serialize};

/// A message to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    /// Destination phone number.
    pub to: String,
    /// Message text.
    pub body: String,
    /// Sender number. Falls back to the configured number when `None`.
    pub from: Option<String>,
    /// Scheduled send time (RFC 3339). Sent immediately when `None`.
    pub send_at: Option<String>,
}

impl SendRequest {
    /// Create a request for an immediate text message.
    pub fn text(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            body: body.into(),
            from: None,
            send_at: None,
        }
    }

    /// Override the sender number.
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Schedule the message for later delivery.
    pub fn scheduled_at(mut self, send_at: impl Into<String>) -> Self {
        self.send_at = Some(send_at.into());
        self
    }
}

/// Message status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Accepted,
    Scheduled,
    Queued,
    Sending,
    Sent,
    Delivered,
    Undelivered,
    Failed,
    Read,
    Receiving,
    Received,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl ProviderStatus {
    /// Parse a status string from a webhook parameter.
    pub fn parse(value: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(value.to_ascii_lowercase()))
            .unwrap_or(ProviderStatus::Unknown)
    }
}

/// The provider's acknowledgment of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Provider-assigned message id.
    pub sid: String,
    /// Status at acknowledgment time.
    pub status: ProviderStatus,
}

/// Form body for the message creation endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct CreateMessageForm<'a> {
    pub to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messaging_service_sid: Option<&'a str>,
    pub body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_callback: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_at: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_type: Option<&'a str>,
}

/// Successful message creation response (fields we use).
#[derive(Debug, Deserialize)]
pub(crate) struct CreateMessageResponse {
    pub sid: String,
    pub status: ProviderStatus,
}

/// Error response body.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}
