//! Outbound SMS campaign pipeline.
//!
//! - [`ingest`]: stream uploaded contact lists into the contact store
//! - [`invitation`]: generate randomized, personalized invitation texts
//! - [`delivery`]: dispatch through the SMS provider and handle webhooks
//! - [`events`]: live events for operators, published through [`fanout`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use campaign::{DeliveryConfig, DeliveryService, Ingestor, InvitationService, UploadMode};
//! use database::{campaign as campaigns, Database};
//! use sms_gateway::mock::RecordingProvider;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::in_memory().await?;
//! let survey = campaigns::create_campaign(db.pool(), "Spring survey", "operator-1").await?;
//!
//! let csv = "name,phone,link\nJane,+15550001,https://s.example/1\n";
//! let rows = campaign::ingest::csv_rows(std::io::Cursor::new(csv), 64);
//! let summary = Ingestor::new(db.clone()).ingest(&survey.id, UploadMode::Simple, rows).await?;
//! assert_eq!(summary.imported, 1);
//!
//! let provider = Arc::new(RecordingProvider::new("+15550000"));
//! let delivery = DeliveryService::new(
//!     db.clone(),
//!     provider,
//!     DeliveryConfig::new("token", "https://x/api/webhook", "https://x/api/webhook/status"),
//! );
//! let invitations = InvitationService::new(db.clone());
//! # let _ = (delivery, invitations);
//! # Ok(())
//! # }
//! ```

pub mod delivery;
pub mod error;
pub mod events;
pub mod ingest;
pub mod invitation;

pub use delivery::{
    DeliveryConfig, DeliveryService, DispatchOutcome, DispatchReport, DispatchResult,
    InboundAction, StatusOutcome, WebhookOutcome, OPT_OUT_CONFIRMATION,
};
pub use error::{DeliveryError, ErrorClass, IngestError, InvitationError};
pub use events::{publish_all, OperatorEvent, OptOut, Publication, StatusChange};
pub use ingest::{IngestSummary, Ingestor, UploadMode};
pub use invitation::{GeneratedInvitation, InvitationService, Section};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
