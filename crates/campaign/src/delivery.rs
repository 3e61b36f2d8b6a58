//! Message delivery: dispatch through the provider and webhook handling.
//!
//! Outgoing messages are created with the provider's acknowledgment status
//! and then only move forward as status callbacks arrive. Inbound replies are
//! recorded against the contact, except the stop keyword, which opts the
//! phone number out everywhere.
//!
//! Webhook handlers never publish live events themselves. They return the
//! [`Publication`]s their state change produced and the caller delivers them.

use std::collections::HashMap;
use std::sync::Arc;

use database::{
    campaign, contact, message, template, Contact, Database, DatabaseError, Message, MessageStatus,
    MessageType, NewMessage, StatusUpdate,
};
use serde::Serialize;
use sms_gateway::{
    verify_signature, ErrorKind, InboundSms, ProviderError, ProviderStatus, SendRequest,
    SmsProvider, StatusReport,
};
use tracing::{debug, info, warn};

use crate::error::DeliveryError;
use crate::events::{OperatorEvent, OptOut, Publication, StatusChange};

/// Reply sent once to a phone number that unsubscribed.
pub const OPT_OUT_CONFIRMATION: &str =
    "You have been successfully unsubscribed. You will not receive any more messages from us.";

/// Settings for the delivery service.
#[derive(Clone)]
pub struct DeliveryConfig {
    /// Provider auth token, the webhook signing secret.
    pub auth_token: String,
    /// Public URL of the inbound-message webhook, as the provider signs it.
    pub inbound_url: String,
    /// Public URL of the status callback, as the provider signs it.
    pub status_url: String,
    /// Confirmation text for the stop keyword.
    pub opt_out_confirmation: String,
}

impl DeliveryConfig {
    pub fn new(
        auth_token: impl Into<String>,
        inbound_url: impl Into<String>,
        status_url: impl Into<String>,
    ) -> Self {
        Self {
            auth_token: auth_token.into(),
            inbound_url: inbound_url.into(),
            status_url: status_url.into(),
            opt_out_confirmation: OPT_OUT_CONFIRMATION.to_string(),
        }
    }
}

impl std::fmt::Debug for DeliveryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryConfig")
            .field("auth_token", &"[redacted]")
            .field("inbound_url", &self.inbound_url)
            .field("status_url", &self.status_url)
            .finish()
    }
}

/// What an inbound webhook did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundAction {
    /// The stop keyword: these contacts are now opted out.
    OptedOut {
        contact_ids: Vec<String>,
        confirmation_sent: bool,
    },
    /// A reply was stored.
    Recorded(Message),
    /// The provider redelivered a message (reply or stop) that is already stored.
    Duplicate(Message),
}

/// Result of an inbound webhook, with the events it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookOutcome {
    pub action: InboundAction,
    pub publications: Vec<Publication>,
}

/// Result of a status callback, with the events it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusOutcome {
    pub update: StatusUpdate,
    pub publications: Vec<Publication>,
}

/// Result of writing an inbound message to the log.
enum Logged {
    New(Message),
    Duplicate(Message),
}

/// Per-invitation result of a bulk dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub invitation_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(flatten)]
    pub result: DispatchResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum DispatchResult {
    Sent {
        message_id: String,
        status: MessageStatus,
    },
    Failed {
        reason: String,
    },
}

/// Per-invitation results of a bulk dispatch, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub outcomes: Vec<DispatchOutcome>,
}

impl DispatchReport {
    fn push(&mut self, outcome: DispatchOutcome) {
        match outcome.result {
            DispatchResult::Sent { .. } => self.sent += 1,
            DispatchResult::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// Map a provider status onto the message lifecycle.
///
/// Statuses with no lifecycle meaning (inbound-only, unknown) map to `None`.
pub fn map_provider_status(status: ProviderStatus) -> Option<MessageStatus> {
    match status {
        ProviderStatus::Accepted
        | ProviderStatus::Scheduled
        | ProviderStatus::Queued
        | ProviderStatus::Sending => Some(MessageStatus::Queued),
        ProviderStatus::Sent => Some(MessageStatus::Sent),
        ProviderStatus::Delivered => Some(MessageStatus::Delivered),
        ProviderStatus::Read => Some(MessageStatus::Read),
        ProviderStatus::Failed | ProviderStatus::Undelivered | ProviderStatus::Canceled => {
            Some(MessageStatus::Failed)
        }
        ProviderStatus::Receiving | ProviderStatus::Received | ProviderStatus::Unknown => None,
    }
}

/// Turn a provider rejection into a delivery failure.
pub fn classify_provider_error(phone: &str, err: ProviderError) -> DeliveryError {
    match err.kind() {
        ErrorKind::RecipientBlocked => DeliveryError::RecipientBlocked {
            phone: phone.to_string(),
        },
        ErrorKind::InvalidNumber => DeliveryError::InvalidNumber {
            phone: phone.to_string(),
        },
        ErrorKind::Other => DeliveryError::Provider(err),
    }
}

/// Drives outgoing messages and handles provider webhooks.
#[derive(Clone)]
pub struct DeliveryService {
    db: Database,
    provider: Arc<dyn SmsProvider>,
    config: DeliveryConfig,
}

impl DeliveryService {
    pub fn new(db: Database, provider: Arc<dyn SmsProvider>, config: DeliveryConfig) -> Self {
        Self {
            db,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Send a message to a contact and record it.
    ///
    /// Opted-out contacts are refused before the provider is called. A send
    /// the provider rejects leaves no message behind.
    pub async fn dispatch(
        &self,
        operator_id: &str,
        contact: &Contact,
        text: &str,
        scheduled_for: Option<&str>,
    ) -> Result<Message, DeliveryError> {
        if contact.opted_out {
            info!(contact_id = %contact.id, "Refusing dispatch to opted-out contact");
            return Err(DeliveryError::OptedOut {
                contact_id: contact.id.clone(),
            });
        }

        let mut request = SendRequest::text(&contact.phone, text);
        if let Some(send_at) = scheduled_for {
            request = request.scheduled_at(send_at);
        }

        let receipt = self.provider.send(request).await.map_err(|e| {
            warn!(contact_id = %contact.id, code = ?e.code(), error = %e, "Provider rejected message");
            classify_provider_error(&contact.phone, e)
        })?;

        let status = map_provider_status(receipt.status).unwrap_or(MessageStatus::Queued);
        let message = message::create_message(
            self.db.pool(),
            &NewMessage {
                campaign_id: contact.campaign_id.clone(),
                contact_id: contact.id.clone(),
                operator_id: operator_id.to_string(),
                content: text.to_string(),
                message_type: MessageType::Outgoing,
                status,
                provider_sid: Some(receipt.sid),
                scheduled_for: scheduled_for.map(str::to_string),
            },
        )
        .await?;

        info!(
            message_id = %message.id,
            contact_id = %contact.id,
            status = %message.status,
            "Message dispatched"
        );
        Ok(message)
    }

    /// Dispatch logged invitations to their contacts.
    ///
    /// One contact's failure does not stop the others. Storage failures abort.
    pub async fn dispatch_invitations(
        &self,
        operator_id: &str,
        campaign_id: &str,
        invitation_ids: &[i64],
    ) -> Result<DispatchReport, DeliveryError> {
        let pool = self.db.pool();
        let invitations = template::get_invitations(pool, campaign_id, invitation_ids).await?;
        let contact_ids: Vec<String> = invitations.iter().map(|i| i.contact_id.clone()).collect();
        let contacts: HashMap<String, Contact> = contact::get_contacts(pool, &contact_ids)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        let mut report = DispatchReport::default();
        for &invitation_id in invitation_ids {
            let Some(invitation) = invitations.iter().find(|i| i.id == invitation_id) else {
                report.push(DispatchOutcome {
                    invitation_id,
                    contact_id: None,
                    result: DispatchResult::Failed {
                        reason: format!("invitation not found: {}", invitation_id),
                    },
                });
                continue;
            };

            let result = match contacts.get(&invitation.contact_id) {
                None => DispatchResult::Failed {
                    reason: format!("contact not found: {}", invitation.contact_id),
                },
                Some(contact) => match self.dispatch(operator_id, contact, &invitation.text, None).await {
                    Ok(message) => DispatchResult::Sent {
                        message_id: message.id,
                        status: message.status,
                    },
                    Err(DeliveryError::Database(e)) => return Err(e.into()),
                    Err(e) => DispatchResult::Failed {
                        reason: e.to_string(),
                    },
                },
            };

            report.push(DispatchOutcome {
                invitation_id,
                contact_id: Some(invitation.contact_id.clone()),
                result,
            });
        }

        info!(
            campaign_id,
            sent = report.sent,
            failed = report.failed,
            "Invitation dispatch complete"
        );
        Ok(report)
    }

    fn verify(&self, url: &str, signature: Option<&str>, params: &[(String, String)]) -> Result<(), DeliveryError> {
        match signature {
            Some(signature) if verify_signature(&self.config.auth_token, signature, url, params) => Ok(()),
            _ => {
                warn!(url, "Rejected webhook with invalid signature");
                Err(DeliveryError::InvalidSignature)
            }
        }
    }

    /// Handle an inbound SMS webhook.
    pub async fn handle_inbound_webhook(
        &self,
        signature: Option<&str>,
        params: &[(String, String)],
    ) -> Result<WebhookOutcome, DeliveryError> {
        self.verify(&self.config.inbound_url, signature, params)?;
        let sms = InboundSms::from_params(params).ok_or(DeliveryError::MalformedPayload("missing From"))?;

        let contacts = contact::find_contacts_by_phone(self.db.pool(), &sms.from).await?;
        if contacts.is_empty() {
            warn!(from = %sms.from, "Inbound message from unknown number");
            return Err(DeliveryError::ContactNotFound(sms.from));
        }

        if sms.is_stop() {
            self.opt_out(sms, contacts).await
        } else {
            self.record_reply(sms, &contacts[0]).await
        }
    }

    /// Opt the sender out of every campaign and confirm once.
    ///
    /// The stop message is logged against the newest matching contact. A
    /// redelivered webhook collides on its provider message id and neither
    /// confirms nor publishes again.
    async fn opt_out(&self, sms: InboundSms, contacts: Vec<Contact>) -> Result<WebhookOutcome, DeliveryError> {
        let pool = self.db.pool();
        let phone = sms.from.clone();
        let updated = contact::opt_out_by_phone(pool, &phone).await?;
        info!(phone = %phone, contacts = updated, "Phone number opted out");

        let newest = &contacts[0];
        let owner = campaign::get_campaign(pool, &newest.campaign_id).await?.operator_id;
        if let Logged::Duplicate(existing) = self.log_incoming(sms, newest, &owner).await? {
            debug!(phone = %phone, message_id = %existing.id, "Stop already handled");
            return Ok(WebhookOutcome {
                action: InboundAction::Duplicate(existing),
                publications: Vec::new(),
            });
        }

        let mut owners: HashMap<String, String> = HashMap::new();
        owners.insert(newest.campaign_id.clone(), owner);
        let mut publications = Vec::with_capacity(contacts.len());
        for contact in &contacts {
            let operator_id = match owners.get(&contact.campaign_id) {
                Some(operator_id) => operator_id.clone(),
                None => {
                    let owner = campaign::get_campaign(pool, &contact.campaign_id).await?.operator_id;
                    owners.insert(contact.campaign_id.clone(), owner.clone());
                    owner
                }
            };
            publications.push(Publication::new(
                operator_id,
                OperatorEvent::ContactOptedOut(OptOut {
                    contact_id: contact.id.clone(),
                    campaign_id: contact.campaign_id.clone(),
                    phone: contact.phone.clone(),
                }),
            ));
        }

        // Sent directly: the opt-out guard in `dispatch` would refuse it.
        let confirmation = SendRequest::text(&phone, &self.config.opt_out_confirmation);
        let confirmation_sent = match self.provider.send(confirmation).await {
            Ok(receipt) => {
                debug!(phone = %phone, sid = %receipt.sid, "Opt-out confirmation sent");
                true
            }
            Err(e) => {
                warn!(phone = %phone, error = %e, "Failed to send opt-out confirmation");
                false
            }
        };

        Ok(WebhookOutcome {
            action: InboundAction::OptedOut {
                contact_ids: contacts.into_iter().map(|c| c.id).collect(),
                confirmation_sent,
            },
            publications,
        })
    }

    async fn record_reply(&self, sms: InboundSms, contact: &Contact) -> Result<WebhookOutcome, DeliveryError> {
        let operator_id = campaign::get_campaign(self.db.pool(), &contact.campaign_id)
            .await?
            .operator_id;

        match self.log_incoming(sms, contact, &operator_id).await? {
            Logged::New(message) => {
                info!(message_id = %message.id, contact_id = %contact.id, "Inbound message recorded");
                Ok(WebhookOutcome {
                    publications: vec![Publication::new(
                        operator_id,
                        OperatorEvent::NewMessage(message.clone()),
                    )],
                    action: InboundAction::Recorded(message),
                })
            }
            Logged::Duplicate(existing) => {
                debug!(message_id = %existing.id, "Inbound message already recorded");
                Ok(WebhookOutcome {
                    action: InboundAction::Duplicate(existing),
                    publications: Vec::new(),
                })
            }
        }
    }

    async fn log_incoming(
        &self,
        sms: InboundSms,
        contact: &Contact,
        operator_id: &str,
    ) -> Result<Logged, DeliveryError> {
        let pool = self.db.pool();
        let created = message::create_message(
            pool,
            &NewMessage {
                campaign_id: contact.campaign_id.clone(),
                contact_id: contact.id.clone(),
                operator_id: operator_id.to_string(),
                content: sms.body,
                message_type: MessageType::Incoming,
                status: MessageStatus::Delivered,
                provider_sid: sms.sid,
                scheduled_for: None,
            },
        )
        .await;

        match created {
            Ok(message) => Ok(Logged::New(message)),
            Err(DatabaseError::DuplicateMessage { provider_sid }) => {
                let existing = message::get_message_by_provider_sid(pool, &provider_sid).await?;
                Ok(Logged::Duplicate(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Handle a delivery status callback.
    ///
    /// Only forward transitions are applied; anything else is ignored.
    pub async fn handle_status_callback(
        &self,
        signature: Option<&str>,
        params: &[(String, String)],
    ) -> Result<StatusOutcome, DeliveryError> {
        self.verify(&self.config.status_url, signature, params)?;
        let report = StatusReport::from_params(params)
            .ok_or(DeliveryError::MalformedPayload("missing MessageSid or MessageStatus"))?;

        let pool = self.db.pool();
        let current = match message::get_message_by_provider_sid(pool, &report.sid).await {
            Ok(message) => message,
            Err(DatabaseError::NotFound { .. }) => return Err(DeliveryError::MessageNotFound(report.sid)),
            Err(e) => return Err(e.into()),
        };

        if current.message_type == MessageType::Incoming {
            debug!(sid = %report.sid, "Ignoring status callback for an incoming message");
            return Ok(StatusOutcome {
                update: StatusUpdate::Ignored {
                    current: current.status,
                },
                publications: Vec::new(),
            });
        }

        let Some(next) = map_provider_status(report.status) else {
            debug!(sid = %report.sid, status = ?report.status, "Ignoring status without lifecycle meaning");
            return Ok(StatusOutcome {
                update: StatusUpdate::Ignored {
                    current: current.status,
                },
                publications: Vec::new(),
            });
        };

        let update = message::advance_status(pool, &current.id, next, report.error_code).await?;
        let publications = match &update {
            StatusUpdate::Applied(message) => {
                info!(message_id = %message.id, status = %message.status, "Message status advanced");
                vec![Publication::new(
                    message.operator_id.clone(),
                    OperatorEvent::MessageStatus(StatusChange {
                        message_id: message.id.clone(),
                        contact_id: message.contact_id.clone(),
                        status: message.status,
                        error_code: message.error_code,
                    }),
                )]
            }
            StatusUpdate::Ignored { current: status } => {
                debug!(message_id = %current.id, %status, requested = %next, "Ignoring out-of-order status");
                Vec::new()
            }
        };

        Ok(StatusOutcome {
            update,
            publications,
        })
    }
}
