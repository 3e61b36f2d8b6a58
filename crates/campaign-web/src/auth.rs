//! Operator authentication.

use axum::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use database::{campaign, Campaign};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated operator making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub id: String,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Token from `Authorization: Bearer`, or `?token=` for EventSource clients
/// that cannot set headers.
fn request_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(AUTHORIZATION) {
        let value = value.to_str().ok()?;
        return Some(value.strip_prefix("Bearer ").unwrap_or(value).trim().to_string());
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(query)| query.token)
}

#[async_trait]
impl FromRequestParts<AppState> for Operator {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = request_token(parts).ok_or(ApiError::Unauthorized)?;
        state
            .operators
            .get(&token)
            .map(|id| Operator { id: id.clone() })
            .ok_or(ApiError::Unauthorized)
    }
}

impl Operator {
    /// Load a campaign and check that this operator owns it.
    pub async fn campaign(&self, state: &AppState, campaign_id: &str) -> Result<Campaign, ApiError> {
        let campaign = campaign::get_campaign(state.db.pool(), campaign_id).await?;
        if campaign.operator_id != self.id {
            tracing::warn!(operator_id = %self.id, campaign_id, "Operator does not own campaign");
            return Err(ApiError::Forbidden(campaign_id.to_string()));
        }
        Ok(campaign)
    }
}
