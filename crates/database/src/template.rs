//! Template and invitation log operations.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{Invitation, Template, TemplateRow, TemplateSections};

/// Store a new template for a campaign.
pub async fn create_template(
    pool: &SqlitePool,
    campaign_id: &str,
    name: &str,
    sections: &TemplateSections,
) -> Result<Template> {
    let id = uuid::Uuid::new_v4().to_string();
    let encoded = serde_json::to_string(sections)?;

    sqlx::query(
        r#"
        INSERT INTO templates (id, campaign_id, name, sections)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(campaign_id)
    .bind(name)
    .bind(encoded)
    .execute(pool)
    .await?;

    get_template(pool, &id).await
}

/// Get a template by ID.
pub async fn get_template(pool: &SqlitePool, id: &str) -> Result<Template> {
    let row = sqlx::query_as::<_, TemplateRow>(
        r#"
        SELECT id, campaign_id, name, sections, created_at
        FROM templates
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "template",
        id: id.to_string(),
    })?;

    Ok(Template::try_from(row)?)
}

/// Append generated invitations to a campaign's log in one transaction.
///
/// Each entry is `(contact_id, text)`. Returns the stored rows in input order.
pub async fn append_invitations(
    pool: &SqlitePool,
    campaign_id: &str,
    template_id: &str,
    entries: &[(String, String)],
) -> Result<Vec<Invitation>> {
    let mut tx = pool.begin().await?;
    let mut stored = Vec::with_capacity(entries.len());

    for (contact_id, text) in entries {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            INSERT INTO invitations (campaign_id, template_id, contact_id, text)
            VALUES (?, ?, ?, ?)
            RETURNING id, campaign_id, template_id, contact_id, text, created_at
            "#,
        )
        .bind(campaign_id)
        .bind(template_id)
        .bind(contact_id)
        .bind(text)
        .fetch_one(&mut *tx)
        .await?;

        stored.push(invitation);
    }

    tx.commit().await?;
    Ok(stored)
}

/// List a campaign's invitation log, oldest first.
pub async fn list_invitations(pool: &SqlitePool, campaign_id: &str) -> Result<Vec<Invitation>> {
    let invitations = sqlx::query_as::<_, Invitation>(
        r#"
        SELECT id, campaign_id, template_id, contact_id, text, created_at
        FROM invitations
        WHERE campaign_id = ?
        ORDER BY id
        "#,
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    Ok(invitations)
}

/// Get invitations of a campaign by ID. Unknown IDs are simply absent.
pub async fn get_invitations(
    pool: &SqlitePool,
    campaign_id: &str,
    ids: &[i64],
) -> Result<Vec<Invitation>> {
    let mut invitations = Vec::with_capacity(ids.len());

    for id in ids {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            SELECT id, campaign_id, template_id, contact_id, text, created_at
            FROM invitations
            WHERE id = ? AND campaign_id = ?
            "#,
        )
        .bind(id)
        .bind(campaign_id)
        .fetch_optional(pool)
        .await?;

        if let Some(invitation) = invitation {
            invitations.push(invitation);
        }
    }

    Ok(invitations)
}
