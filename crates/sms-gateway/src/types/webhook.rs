//! Webhook payloads posted by the provider.
//!
//! Payloads arrive as form parameters. They are kept as raw `(name, value)`
//! pairs until the signature is verified, then parsed into these types.

use crate::types::send::ProviderStatus;

/// Raw form parameters of a webhook request.
pub type WebhookParams = Vec<(String, String)>;

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// An inbound SMS from a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundSms {
    /// Sender phone number.
    pub from: String,
    /// Message text.
    pub body: String,
    /// Provider message id, if present.
    pub sid: Option<String>,
}

impl InboundSms {
    /// Parse from webhook parameters. Requires `From`; a missing `Body` is empty.
    pub fn from_params(params: &[(String, String)]) -> Option<Self> {
        Some(Self {
            from: param(params, "From")?.to_string(),
            body: param(params, "Body").unwrap_or_default().to_string(),
            sid: param(params, "MessageSid").map(str::to_string),
        })
    }

    /// Whether the body is the unsubscribe keyword.
    pub fn is_stop(&self) -> bool {
        self.body.trim().eq_ignore_ascii_case("stop")
    }
}

/// A delivery status change for an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Provider message id.
    pub sid: String,
    /// Reported status.
    pub status: ProviderStatus,
    /// Provider error code accompanying a failure.
    pub error_code: Option<i64>,
}

impl StatusReport {
    /// Parse from webhook parameters. Requires `MessageSid` and `MessageStatus`.
    pub fn from_params(params: &[(String, String)]) -> Option<Self> {
        Some(Self {
            sid: param(params, "MessageSid")?.to_string(),
            status: ProviderStatus::parse(param(params, "MessageStatus")?),
            error_code: param(params, "ErrorCode").and_then(|code| code.trim().parse().ok()),
        })
    }
}
