//! Single-message dispatch and the message log.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use database::{contact, message, Message};
use serde::Deserialize;

use crate::auth::Operator;
use crate::error::{ApiError, Result};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 200;
const MAX_LIMIT: i64 = 1000;

/// Request to send one message.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub contact_id: String,
    pub content: String,
    pub scheduled_for: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub contact_id: Option<String>,
    pub limit: Option<i64>,
}

/// Send a message to one contact.
pub async fn send(
    State(state): State<AppState>,
    operator: Operator,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>)> {
    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content is required".to_string()));
    }

    let contact = contact::get_contact(state.db.pool(), &req.contact_id).await?;
    operator.campaign(&state, &contact.campaign_id).await?;

    let message = state
        .delivery
        .dispatch(&operator.id, &contact, &req.content, req.scheduled_for.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// The conversation with one contact, or the operator's latest messages.
pub async fn list(
    State(state): State<AppState>,
    operator: Operator,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Message>>> {
    let pool = state.db.pool();

    let messages = match query.contact_id {
        Some(contact_id) => {
            let contact = contact::get_contact(pool, &contact_id).await?;
            operator.campaign(&state, &contact.campaign_id).await?;
            message::list_messages_for_contact(pool, &contact_id).await?
        }
        None => {
            let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
            message::list_messages_for_operator(pool, &operator.id, limit).await?
        }
    };

    Ok(Json(messages))
}
