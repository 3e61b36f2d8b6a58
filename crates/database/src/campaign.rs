//! Campaign operations.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::Campaign;

/// Create a campaign owned by `operator_id`.
pub async fn create_campaign(pool: &SqlitePool, name: &str, operator_id: &str) -> Result<Campaign> {
    let id = uuid::Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO campaigns (id, name, operator_id)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(name)
    .bind(operator_id)
    .execute(pool)
    .await?;

    get_campaign(pool, &id).await
}

/// Get a campaign by ID.
pub async fn get_campaign(pool: &SqlitePool, id: &str) -> Result<Campaign> {
    sqlx::query_as::<_, Campaign>(
        r#"
        SELECT id, name, operator_id, created_at
        FROM campaigns
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "campaign",
        id: id.to_string(),
    })
}

/// List the campaigns owned by an operator.
pub async fn list_campaigns_for_operator(
    pool: &SqlitePool,
    operator_id: &str,
) -> Result<Vec<Campaign>> {
    let campaigns = sqlx::query_as::<_, Campaign>(
        r#"
        SELECT id, name, operator_id, created_at
        FROM campaigns
        WHERE operator_id = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(operator_id)
    .fetch_all(pool)
    .await?;

    Ok(campaigns)
}
