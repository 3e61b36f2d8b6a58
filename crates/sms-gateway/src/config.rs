//! Configuration types for sms-gateway.

/// Default REST API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// Configuration for talking to the SMS provider.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Base URL of the REST API (e.g., "https://api.twilio.com").
    pub api_base: String,
    /// Account SID, also the basic-auth user.
    pub account_sid: String,
    /// Auth token. Basic-auth password and webhook signing secret.
    pub auth_token: String,
    /// Sender phone number for outgoing messages.
    pub from_number: String,
    /// URL the provider posts delivery status changes to.
    pub status_callback_url: Option<String>,
    /// Messaging service used as the sender. Required for scheduled sends.
    pub messaging_service_sid: Option<String>,
}

impl ProviderConfig {
    /// Create a new configuration against the default API base.
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
    ) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
            status_callback_url: None,
            messaging_service_sid: None,
        }
    }

    /// Point the client at a different API base (test servers, regional edges).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Ask the provider to report status changes to this URL.
    pub fn with_status_callback(mut self, url: impl Into<String>) -> Self {
        self.status_callback_url = Some(url.into());
        self
    }

    /// Send through a messaging service instead of the bare sender number.
    pub fn with_messaging_service(mut self, sid: impl Into<String>) -> Self {
        self.messaging_service_sid = Some(sid.into());
        self
    }

    /// Get the message creation endpoint URL.
    pub fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base,
            urlencoding::encode(&self.account_sid)
        )
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_base", &self.api_base)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("from_number", &self.from_number)
            .field("status_callback_url", &self.status_callback_url)
            .field("messaging_service_sid", &self.messaging_service_sid)
            .finish()
    }
}
