//! Campaign, template and contact upload routes.

use std::io::SeekFrom;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use campaign::ingest::{csv_rows, DEFAULT_ROW_BUFFER};
use campaign::invitation::validate_template;
use campaign::{IngestSummary, UploadMode};
use database::{campaign as campaigns, template, Campaign, Template, TemplateSections};
use futures::StreamExt;
use serde::Deserialize;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::info;

use crate::auth::Operator;
use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Request to create a campaign.
#[derive(Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
}

/// Request to store a template.
#[derive(Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub sections: TemplateSections,
}

#[derive(Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub mode: UploadMode,
}

/// Create a campaign owned by the caller.
pub async fn create_campaign(
    State(state): State<AppState>,
    operator: Operator,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Campaign>)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name is required".to_string()));
    }

    let campaign = campaigns::create_campaign(state.db.pool(), name, &operator.id).await?;
    info!(campaign_id = %campaign.id, operator_id = %operator.id, "Campaign created");
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// List the caller's campaigns, newest first.
pub async fn list_campaigns(
    State(state): State<AppState>,
    operator: Operator,
) -> Result<Json<Vec<Campaign>>> {
    let campaigns = campaigns::list_campaigns_for_operator(state.db.pool(), &operator.id).await?;
    Ok(Json(campaigns))
}

/// Store a template after checking that every section has variants.
pub async fn create_template(
    State(state): State<AppState>,
    operator: Operator,
    Path(campaign_id): Path<String>,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<Template>)> {
    operator.campaign(&state, &campaign_id).await?;
    validate_template(&req.sections)?;

    let template =
        template::create_template(state.db.pool(), &campaign_id, req.name.trim(), &req.sections)
            .await?;
    info!(campaign_id = %campaign_id, template_id = %template.id, "Template created");
    Ok((StatusCode::CREATED, Json(template)))
}

/// Ingest a CSV upload. The request body is the file.
pub async fn upload_contacts(
    State(state): State<AppState>,
    operator: Operator,
    Path(campaign_id): Path<String>,
    Query(query): Query<UploadQuery>,
    body: Body,
) -> Result<Json<IngestSummary>> {
    operator.campaign(&state, &campaign_id).await?;

    let file = spool(body).await?;
    let rows = csv_rows(file, DEFAULT_ROW_BUFFER);
    let summary = state.ingestor.ingest(&campaign_id, query.mode, rows).await?;

    Ok(Json(summary))
}

/// Write the request body to an anonymous temporary file, rewound for reading.
async fn spool(body: Body) -> Result<std::fs::File> {
    let mut file = tokio::fs::File::from_std(tempfile::tempfile()?);
    let mut chunks = body.into_data_stream();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    file.seek(SeekFrom::Start(0)).await?;
    Ok(file.into_std().await)
}
