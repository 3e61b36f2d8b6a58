//! SMS provider REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::types::send::{ApiErrorResponse, CreateMessageForm, CreateMessageResponse};
use crate::types::{SendReceipt, SendRequest};

/// Something that can hand a text message to an SMS network.
///
/// Abstracted so the delivery pipeline can run against the real provider,
/// a test double, or a different vendor.
#[async_trait]
pub trait SmsProvider: Send + Sync {
    /// Submit a message. Returns the provider acknowledgment or its rejection.
    async fn send(&self, request: SendRequest) -> Result<SendReceipt, ProviderError>;

    /// Sender number used when a request does not specify one.
    fn from_number(&self) -> &str;
}

/// Client for a Twilio-compatible messaging REST API.
#[derive(Clone)]
pub struct SmsClient {
    http: Client,
    config: ProviderConfig,
}

impl SmsClient {
    /// Build a client. No request is made until the first send.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ProviderError::Http)?;

        Ok(Self { http, config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

#[async_trait]
impl SmsProvider for SmsClient {
    async fn send(&self, request: SendRequest) -> Result<SendReceipt, ProviderError> {
        let messaging_service_sid = self.config.messaging_service_sid.as_deref();
        if request.send_at.is_some() && messaging_service_sid.is_none() {
            warn!(to = %request.to, "Scheduled send without a messaging service");
            return Err(ProviderError::SchedulingUnavailable);
        }

        // A messaging service picks the sender itself unless one is forced.
        let from = match (&request.from, messaging_service_sid) {
            (Some(from), _) => Some(from.as_str()),
            (None, Some(_)) => None,
            (None, None) => Some(self.config.from_number.as_str()),
        };
        let form = CreateMessageForm {
            to: &request.to,
            from,
            messaging_service_sid,
            body: &request.body,
            status_callback: self.config.status_callback_url.as_deref(),
            send_at: request.send_at.as_deref(),
            schedule_type: request.send_at.as_ref().map(|_| "fixed"),
        };

        debug!(to = %request.to, scheduled = request.send_at.is_some(), "Submitting message");

        let response = self
            .http
            .post(self.config.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(ProviderError::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(ProviderError::Http)?;

        if !status.is_success() {
            let error = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(ApiErrorResponse {
                    code: Some(code),
                    message,
                }) => ProviderError::Api {
                    code,
                    status: status.as_u16(),
                    message,
                },
                _ => ProviderError::Unexpected(format!("HTTP {}: {}", status, body)),
            };
            warn!(to = %request.to, error = %error, "Provider rejected message");
            return Err(error);
        }

        let created: CreateMessageResponse = serde_json::from_str(&body)?;
        debug!(sid = %created.sid, status = ?created.status, "Provider accepted message");

        Ok(SendReceipt {
            sid: created.sid,
            status: created.status,
        })
    }

    fn from_number(&self) -> &str {
        &self.config.from_number
    }
}

impl std::fmt::Debug for SmsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsClient")
            .field("config", &self.config)
            .finish()
    }
}
