//! Wire types exchanged with the SMS provider.

pub mod send;
pub mod webhook;

pub use send::{ProviderStatus, SendReceipt, SendRequest};
pub use webhook::{InboundSms, StatusReport, WebhookParams};
