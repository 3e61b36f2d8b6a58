//! Provider webhooks: inbound messages and status callbacks.
//!
//! Both are authenticated by the provider's request signature, not by an
//! operator token.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Form, Json};
use campaign::{publish_all, InboundAction};
use database::StatusUpdate;
use serde_json::{json, Value};
use sms_gateway::{WebhookParams, SIGNATURE_HEADER};
use tracing::debug;

use crate::error::Result;
use crate::state::AppState;

fn signature(headers: &HeaderMap) -> Option<&str> {
    headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok())
}

/// Inbound SMS from a contact.
pub async fn inbound(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<WebhookParams>,
) -> Result<Json<Value>> {
    let outcome = state
        .delivery
        .handle_inbound_webhook(signature(&headers), &params)
        .await?;
    let delivered = publish_all(&state.registry, outcome.publications);
    debug!(delivered, "Published inbound events");

    let body = match outcome.action {
        InboundAction::OptedOut {
            contact_ids,
            confirmation_sent,
        } => json!({
            "message": "Contact opted out",
            "contactIds": contact_ids,
            "confirmationSent": confirmation_sent,
        }),
        InboundAction::Recorded(message) | InboundAction::Duplicate(message) => json!({
            "success": true,
            "data": message,
        }),
    };
    Ok(Json(body))
}

/// Delivery status change for an outgoing message.
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<WebhookParams>,
) -> Result<Json<Value>> {
    let outcome = state
        .delivery
        .handle_status_callback(signature(&headers), &params)
        .await?;
    publish_all(&state.registry, outcome.publications);

    let body = match outcome.update {
        StatusUpdate::Applied(message) => json!({ "applied": true, "status": message.status }),
        StatusUpdate::Ignored { current } => json!({ "applied": false, "status": current }),
    };
    Ok(Json(body))
}
