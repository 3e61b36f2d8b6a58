//! Events pushed to operators' live streams.
//!
//! Pipeline operations return the events they produced as [`Publication`]s
//! instead of pushing them, so the state machine never touches transport.
//! Callers hand them to [`publish_all`].

use database::{Message, MessageStatus};
use fanout::{Delivery, Registry};
use serde::Serialize;

/// A live event, serialized as `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum OperatorEvent {
    /// A contact replied.
    NewMessage(Message),
    /// An outgoing message changed status.
    MessageStatus(StatusChange),
    /// A contact unsubscribed.
    ContactOptedOut(OptOut),
}

impl OperatorEvent {
    /// Value of the `type` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            OperatorEvent::NewMessage(_) => "newMessage",
            OperatorEvent::MessageStatus(_) => "messageStatus",
            OperatorEvent::ContactOptedOut(_) => "contactOptedOut",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub message_id: String,
    pub contact_id: String,
    pub status: MessageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptOut {
    pub contact_id: String,
    pub campaign_id: String,
    pub phone: String,
}

/// An event addressed to one operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub operator_id: String,
    pub event: OperatorEvent,
}

impl Publication {
    pub fn new(operator_id: impl Into<String>, event: OperatorEvent) -> Self {
        Self {
            operator_id: operator_id.into(),
            event,
        }
    }
}

/// Push publications to the registry in order. Returns how many were delivered.
pub fn publish_all(registry: &Registry<OperatorEvent>, publications: Vec<Publication>) -> usize {
    publications
        .into_iter()
        .map(|publication| registry.publish(&publication.operator_id, publication.event))
        .filter(|delivery| *delivery == Delivery::Delivered)
        .count()
}
