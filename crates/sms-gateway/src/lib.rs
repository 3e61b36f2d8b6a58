//! SMS provider client library.
//!
//! This crate provides a Rust client for a Twilio-compatible messaging REST
//! API. It supports:
//!
//! - Sending (optionally scheduled) text messages with a status callback URL
//! - Classifying provider rejections by error code
//! - Verifying webhook signatures and parsing inbound and status payloads
//!
//! # Example
//!
//! ```no_run
//! use sms_gateway::{ProviderConfig, SendRequest, SmsClient, SmsProvider};
//!
//! # async fn example() -> Result<(), sms_gateway::ProviderError> {
//! let config = ProviderConfig::new("ACxxxxxxxx", "auth-token", "+15550000000")
//!     .with_status_callback("https://campaigns.example.com/api/webhook/status");
//! let client = SmsClient::new(config)?;
//!
//! let receipt = client.send(SendRequest::text("+15551234567", "Hello!")).await?;
//! println!("Accepted as {} ({:?})", receipt.sid, receipt.status);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod mock;
pub mod signature;
pub mod types;

pub use client::{SmsClient, SmsProvider};
pub use config::ProviderConfig;
pub use error::{ErrorKind, ProviderError};
pub use signature::{compute_signature, verify_signature, SIGNATURE_HEADER};
pub use types::*;

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
