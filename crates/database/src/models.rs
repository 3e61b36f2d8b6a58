//! Database models.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A survey campaign (project) owned by one operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Campaign {
    /// Campaign UUID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Operator that owns the campaign and receives its live events.
    pub operator_id: String,
    /// Creation timestamp.
    pub created_at: String,
}

/// A contact that can receive invitations, unique per (campaign, phone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Contact UUID, stable across re-uploads of the same phone number.
    pub id: String,
    /// Owning campaign.
    pub campaign_id: String,
    /// Phone number as uploaded (trimmed).
    pub phone: String,
    /// Display name.
    pub name: String,
    /// Set once the contact replies "stop". Blocks further dispatch.
    pub opted_out: bool,
    /// Extra columns from the upload (link, pin, custom variables).
    pub fields: BTreeMap<String, String>,
    /// Creation timestamp.
    pub created_at: String,
}

impl Contact {
    /// Value of an extra field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// A contact ready to be upserted by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub phone: String,
    pub name: String,
    pub fields: BTreeMap<String, String>,
}

/// Storage shape of a contact row; `fields` is a JSON object.
#[derive(Debug, FromRow)]
pub(crate) struct ContactRow {
    pub id: String,
    pub campaign_id: String,
    pub phone: String,
    pub name: String,
    pub opted_out: bool,
    pub fields: String,
    pub created_at: String,
}

impl TryFrom<ContactRow> for Contact {
    type Error = serde_json::Error;

    fn try_from(row: ContactRow) -> Result<Self, Self::Error> {
        Ok(Contact {
            id: row.id,
            campaign_id: row.campaign_id,
            phone: row.phone,
            name: row.name,
            opted_out: row.opted_out,
            fields: serde_json::from_str(&row.fields)?,
            created_at: row.created_at,
        })
    }
}

/// Variant lists for each template section.
///
/// Missing sections deserialize as empty lists so that shape problems surface
/// as validation errors rather than parse errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSections {
    #[serde(default)]
    pub greeting: Vec<String>,
    #[serde(default)]
    pub identifier: Vec<String>,
    #[serde(default)]
    pub message: Vec<String>,
    #[serde(default)]
    pub link: Vec<String>,
    #[serde(default)]
    pub optout: Vec<String>,
}

/// An invitation template belonging to a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub campaign_id: String,
    pub name: String,
    pub sections: TemplateSections,
    pub created_at: String,
}

#[derive(Debug, FromRow)]
pub(crate) struct TemplateRow {
    pub id: String,
    pub campaign_id: String,
    pub name: String,
    pub sections: String,
    pub created_at: String,
}

impl TryFrom<TemplateRow> for Template {
    type Error = serde_json::Error;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        Ok(Template {
            id: row.id,
            campaign_id: row.campaign_id,
            name: row.name,
            sections: serde_json::from_str(&row.sections)?,
            created_at: row.created_at,
        })
    }
}

/// A generated invitation text, appended to the campaign's invitation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Invitation {
    /// Auto-incrementing ID.
    pub id: i64,
    pub campaign_id: String,
    pub template_id: String,
    pub contact_id: String,
    pub text: String,
    pub created_at: String,
}

/// Direction of a message relative to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum MessageType {
    /// Operator to contact.
    Outgoing,
    /// Contact to operator.
    Incoming,
}

/// Delivery status of a message.
///
/// Outgoing messages only move forward: `queued -> sent -> delivered -> read`,
/// with `failed` reachable from `queued` or `sent`. `read` and `failed` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Position along the success path. `Failed` sits outside it.
    fn rank(self) -> Option<u8> {
        match self {
            MessageStatus::Queued => Some(0),
            MessageStatus::Sent => Some(1),
            MessageStatus::Delivered => Some(2),
            MessageStatus::Read => Some(3),
            MessageStatus::Failed => None,
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Read | MessageStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    ///
    /// Repeating the current status is not a transition.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        if self.is_terminal() || self == next {
            return false;
        }
        match (self.rank(), next.rank()) {
            (Some(current), Some(target)) => target > current,
            // Failure only before the message reached the handset.
            (Some(current), None) => current <= 1,
            (None, _) => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Queued => "queued",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(MessageStatus::Queued),
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            "failed" => Ok(MessageStatus::Failed),
            other => Err(format!("unknown message status: {}", other)),
        }
    }
}

/// Which side of the conversation a message endpoint is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Party {
    Operator(String),
    Contact(String),
}

/// A message in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Message {
    /// Message UUID.
    pub id: String,
    pub campaign_id: String,
    pub contact_id: String,
    pub operator_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub status: MessageStatus,
    /// Provider-assigned message id, for either direction.
    pub provider_sid: Option<String>,
    /// Scheduled send time (RFC 3339), if any.
    pub scheduled_for: Option<String>,
    /// Provider error code reported with a failure.
    pub error_code: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Message {
    /// Party that wrote the message.
    pub fn sender(&self) -> Party {
        match self.message_type {
            MessageType::Outgoing => Party::Operator(self.operator_id.clone()),
            MessageType::Incoming => Party::Contact(self.contact_id.clone()),
        }
    }

    /// Party the message was addressed to.
    pub fn recipient(&self) -> Party {
        match self.message_type {
            MessageType::Outgoing => Party::Contact(self.contact_id.clone()),
            MessageType::Incoming => Party::Operator(self.operator_id.clone()),
        }
    }
}

/// Fields for inserting a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub campaign_id: String,
    pub contact_id: String,
    pub operator_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub provider_sid: Option<String>,
    pub scheduled_for: Option<String>,
}
