//! Configuration loaded from environment variables.

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;

use campaign::ingest::DEFAULT_BATCH_SIZE;
use sms_gateway::config::DEFAULT_API_BASE;

/// Campaign server configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address.
    pub addr: SocketAddr,
    /// SQLite database URL.
    pub database_url: String,
    /// Provider account SID.
    pub account_sid: String,
    /// Provider auth token. Also the webhook signing secret.
    pub auth_token: String,
    /// Sender phone number.
    pub from_number: String,
    /// Provider REST API base URL.
    pub api_base: String,
    /// Messaging service sid. Scheduled sends are refused without one.
    pub messaging_service_sid: Option<String>,
    /// Public base URL the provider reaches this server at.
    pub public_base_url: String,
    /// Bearer token to operator id.
    pub operators: HashMap<String, String>,
    /// Contacts per ingestion batch.
    pub ingest_batch_size: usize,
    /// Buffered events per operator stream.
    pub event_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `CAMPAIGN_ADDR` | Server bind address | `127.0.0.1:8790` |
    /// | `SQLITE_PATH` | SQLite database URL | `sqlite:campaign.db?mode=rwc` |
    /// | `TWILIO_ACCOUNT_SID` | Provider account SID | (required) |
    /// | `TWILIO_AUTH_TOKEN` | Provider auth token | (required) |
    /// | `TWILIO_FROM_NUMBER` | Sender phone number | (required) |
    /// | `TWILIO_API_BASE` | Provider API base URL | `https://api.twilio.com` |
    /// | `TWILIO_MESSAGING_SERVICE_SID` | Messaging service, needed for scheduling | (none) |
    /// | `PUBLIC_BASE_URL` | Public URL for webhooks | (required) |
    /// | `OPERATOR_TOKENS` | `token=operatorId,...` | (required) |
    /// | `INGEST_BATCH_SIZE` | Contacts per batch write | `1000` |
    /// | `EVENT_BUFFER` | Events buffered per stream | `64` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through a variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let number = |name: &'static str, default: usize| match lookup(name) {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidNumber(name)),
            None => Ok(default),
        };

        let addr = lookup("CAMPAIGN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8790".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidAddr)?;

        let database_url =
            lookup("SQLITE_PATH").unwrap_or_else(|| "sqlite:campaign.db?mode=rwc".to_string());

        let api_base = lookup("TWILIO_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        Ok(Self {
            addr,
            database_url,
            account_sid: required("TWILIO_ACCOUNT_SID")?,
            auth_token: required("TWILIO_AUTH_TOKEN")?,
            from_number: required("TWILIO_FROM_NUMBER")?,
            api_base,
            messaging_service_sid: lookup("TWILIO_MESSAGING_SERVICE_SID")
                .map(|sid| sid.trim().to_string())
                .filter(|sid| !sid.is_empty()),
            public_base_url: required("PUBLIC_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            operators: parse_operator_tokens(&required("OPERATOR_TOKENS")?)?,
            ingest_batch_size: number("INGEST_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            event_buffer: number("EVENT_BUFFER", fanout::DEFAULT_BUFFER)?,
        })
    }

    /// URL the provider posts inbound messages to.
    pub fn inbound_webhook_url(&self) -> String {
        format!("{}/api/webhook", self.public_base_url)
    }

    /// URL the provider posts status changes to.
    pub fn status_webhook_url(&self) -> String {
        format!("{}/api/webhook/status", self.public_base_url)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("database_url", &self.database_url)
            .field("account_sid", &self.account_sid)
            .field("from_number", &self.from_number)
            .field("api_base", &self.api_base)
            .field("messaging_service_sid", &self.messaging_service_sid)
            .field("public_base_url", &self.public_base_url)
            .field("operators", &self.operators.len())
            .field("ingest_batch_size", &self.ingest_batch_size)
            .field("event_buffer", &self.event_buffer)
            .finish_non_exhaustive()
    }
}

/// Parse `token=operatorId` pairs separated by commas.
fn parse_operator_tokens(value: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut operators = HashMap::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (token, operator_id) = entry
            .split_once('=')
            .map(|(t, o)| (t.trim(), o.trim()))
            .filter(|(t, o)| !t.is_empty() && !o.is_empty())
            .ok_or(ConfigError::InvalidOperatorTokens)?;
        operators.insert(token.to_string(), operator_id.to_string());
    }

    if operators.is_empty() {
        return Err(ConfigError::InvalidOperatorTokens);
    }
    Ok(operators)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid CAMPAIGN_ADDR format")]
    InvalidAddr,

    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{0} must be a positive integer")]
    InvalidNumber(&'static str),

    #[error("OPERATOR_TOKENS must be a comma-separated list of token=operatorId")]
    InvalidOperatorTokens,
}
