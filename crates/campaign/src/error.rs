//! Error types for pipeline operations.

use database::DatabaseError;
use sms_gateway::ProviderError;
use thiserror::Error;

use crate::invitation::Section;

/// Broad class of a failure, used to pick a response at the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input: bad template, invalid number, bad payload.
    Validation,
    /// The caller is not allowed: opted out, blocked, bad signature.
    Permission,
    /// A referenced record does not exist.
    NotFound,
    /// The SMS provider failed for another reason.
    Provider,
    /// Storage or I/O failure.
    Storage,
}

fn database_class(err: &DatabaseError) -> ErrorClass {
    match err {
        DatabaseError::NotFound { .. } => ErrorClass::NotFound,
        _ => ErrorClass::Storage,
    }
}

/// Errors that abort an ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The target campaign does not exist.
    #[error("campaign not found: {0}")]
    CampaignNotFound(String),

    /// The upload could not be read.
    #[error("failed to read upload: {0}")]
    Read(String),

    /// A batch write failed. Earlier batches stay committed.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

impl IngestError {
    pub fn class(&self) -> ErrorClass {
        match self {
            IngestError::CampaignNotFound(_) => ErrorClass::NotFound,
            IngestError::Read(_) => ErrorClass::Storage,
            IngestError::Database(err) => database_class(err),
        }
    }
}

/// Errors from invitation generation.
#[derive(Debug, Error)]
pub enum InvitationError {
    /// A required template section is missing or has no variants.
    #[error("invalid template structure: {0} must be a non-empty list")]
    EmptySection(Section),

    /// The contact belongs to a different campaign than the template.
    #[error("contact {contact_id} is not part of campaign {campaign_id}")]
    CampaignMismatch {
        contact_id: String,
        campaign_id: String,
    },

    /// The template does not exist in this campaign.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// A requested contact does not exist.
    #[error("contact not found: {0}")]
    ContactNotFound(String),

    /// Every contact was filtered out.
    #[error("failed to generate any valid invitations")]
    NothingGenerated,

    /// Storage failure.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

impl InvitationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            InvitationError::EmptySection(_)
            | InvitationError::CampaignMismatch { .. }
            | InvitationError::NothingGenerated => ErrorClass::Validation,
            InvitationError::TemplateNotFound(_) | InvitationError::ContactNotFound(_) => {
                ErrorClass::NotFound
            }
            InvitationError::Database(err) => database_class(err),
        }
    }
}

/// Errors from dispatch and webhook handling.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The contact opted out; the provider was not called.
    #[error("recipient {contact_id} has opted out of messages")]
    OptedOut { contact_id: String },

    /// The provider reports that the recipient blocked the sender.
    #[error("recipient {phone} has blocked this number")]
    RecipientBlocked { phone: String },

    /// The provider rejected the destination number.
    #[error("invalid phone number: {phone}")]
    InvalidNumber { phone: String },

    /// Any other provider or transport failure.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Webhook signature did not verify.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Webhook parameters are missing required fields.
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(&'static str),

    /// No contact has the sending phone number.
    #[error("contact not found for {0}")]
    ContactNotFound(String),

    /// No message has the reported provider id.
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// Storage failure.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

impl DeliveryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DeliveryError::OptedOut { .. }
            | DeliveryError::RecipientBlocked { .. }
            | DeliveryError::InvalidSignature => ErrorClass::Permission,
            DeliveryError::InvalidNumber { .. } | DeliveryError::MalformedPayload(_) => {
                ErrorClass::Validation
            }
            DeliveryError::ContactNotFound(_) | DeliveryError::MessageNotFound(_) => {
                ErrorClass::NotFound
            }
            DeliveryError::Provider(_) => ErrorClass::Provider,
            DeliveryError::Database(err) => database_class(err),
        }
    }
}
