//! Invitation generation and dispatch routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use campaign::DispatchReport;
use database::Invitation;
use serde::Deserialize;

use crate::auth::Operator;
use crate::error::Result;
use crate::state::AppState;

/// Request to generate invitations.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub template_id: String,
    pub contact_ids: Vec<String>,
}

/// Request to dispatch logged invitations.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub invitation_ids: Vec<i64>,
}

/// Generate invitations and append them to the campaign's log.
pub async fn generate(
    State(state): State<AppState>,
    operator: Operator,
    Path(campaign_id): Path<String>,
    Json(req): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<Vec<Invitation>>)> {
    operator.campaign(&state, &campaign_id).await?;

    let invitations = state
        .invitations
        .generate_invitations(&campaign_id, &req.template_id, &req.contact_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(invitations)))
}

/// The campaign's invitation log.
pub async fn list(
    State(state): State<AppState>,
    operator: Operator,
    Path(campaign_id): Path<String>,
) -> Result<Json<Vec<Invitation>>> {
    operator.campaign(&state, &campaign_id).await?;
    Ok(Json(state.invitations.list_invitations(&campaign_id).await?))
}

/// Send logged invitations to their contacts.
pub async fn send(
    State(state): State<AppState>,
    operator: Operator,
    Path(campaign_id): Path<String>,
    Json(req): Json<SendRequest>,
) -> Result<Json<DispatchReport>> {
    operator.campaign(&state, &campaign_id).await?;

    let report = state
        .delivery
        .dispatch_invitations(&operator.id, &campaign_id, &req.invitation_ids)
        .await?;
    Ok(Json(report))
}
