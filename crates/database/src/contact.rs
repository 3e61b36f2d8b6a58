//! Contact store operations.
//!
//! Contacts are keyed by `(campaign_id, phone)`. Uploads go through
//! [`upsert_contacts`], which overwrites the name and extra fields of an
//! existing contact instead of duplicating it. Concurrent upserts of the same
//! phone are last-write-wins.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::{DatabaseError, Result};
use crate::models::{Contact, ContactRow, NewContact};

const CONTACT_COLUMNS: &str = "id, campaign_id, phone, name, opted_out, fields, created_at";

/// Upsert a batch of contacts into a campaign in a single transaction.
///
/// Returns the number of rows written. `opted_out` is never reset by an upsert.
pub async fn upsert_contacts(
    pool: &SqlitePool,
    campaign_id: &str,
    contacts: &[NewContact],
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut written = 0;

    for contact in contacts {
        let fields = serde_json::to_string(&contact.fields)?;
        let result = sqlx::query(
            r#"
            INSERT INTO contacts (id, campaign_id, phone, name, fields)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (campaign_id, phone) DO UPDATE SET
                name = excluded.name,
                fields = excluded.fields
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(campaign_id)
        .bind(&contact.phone)
        .bind(&contact.name)
        .bind(fields)
        .execute(&mut *tx)
        .await?;

        written += result.rows_affected();
    }

    tx.commit().await?;

    tracing::debug!(campaign_id, written, "Upserted contact batch");
    Ok(written)
}

/// Get a contact by ID.
pub async fn get_contact(pool: &SqlitePool, id: &str) -> Result<Contact> {
    let row = sqlx::query_as::<_, ContactRow>(&format!(
        "SELECT {} FROM contacts WHERE id = ?",
        CONTACT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "contact",
        id: id.to_string(),
    })?;

    Ok(Contact::try_from(row)?)
}

/// Get a contact by its campaign and phone number.
pub async fn get_contact_by_phone(
    pool: &SqlitePool,
    campaign_id: &str,
    phone: &str,
) -> Result<Contact> {
    let row = sqlx::query_as::<_, ContactRow>(&format!(
        "SELECT {} FROM contacts WHERE campaign_id = ? AND phone = ?",
        CONTACT_COLUMNS
    ))
    .bind(campaign_id)
    .bind(phone)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "contact",
        id: format!("{}/{}", campaign_id, phone),
    })?;

    Ok(Contact::try_from(row)?)
}

/// Get the contacts with the given IDs. Unknown IDs are simply absent.
pub async fn get_contacts(pool: &SqlitePool, ids: &[String]) -> Result<Vec<Contact>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM contacts WHERE id IN (",
        CONTACT_COLUMNS
    ));
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let rows = query.build_query_as::<ContactRow>().fetch_all(pool).await?;
    rows.into_iter()
        .map(|row| Contact::try_from(row).map_err(DatabaseError::from))
        .collect()
}

/// Find every contact with this phone number, across campaigns.
///
/// Most recently created first.
pub async fn find_contacts_by_phone(pool: &SqlitePool, phone: &str) -> Result<Vec<Contact>> {
    let rows = sqlx::query_as::<_, ContactRow>(&format!(
        "SELECT {} FROM contacts WHERE phone = ? ORDER BY created_at DESC, rowid DESC",
        CONTACT_COLUMNS
    ))
    .bind(phone)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| Contact::try_from(row).map_err(DatabaseError::from))
        .collect()
}

/// Mark every contact with this phone number as opted out.
///
/// Returns the number of contacts updated.
pub async fn opt_out_by_phone(pool: &SqlitePool, phone: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE contacts
        SET opted_out = 1
        WHERE phone = ?
        "#,
    )
    .bind(phone)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// List a campaign's contacts ordered by name.
pub async fn list_contacts(pool: &SqlitePool, campaign_id: &str) -> Result<Vec<Contact>> {
    let rows = sqlx::query_as::<_, ContactRow>(&format!(
        "SELECT {} FROM contacts WHERE campaign_id = ? ORDER BY name, phone",
        CONTACT_COLUMNS
    ))
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| Contact::try_from(row).map_err(DatabaseError::from))
        .collect()
}

/// Count a campaign's contacts.
pub async fn count_contacts(pool: &SqlitePool, campaign_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM contacts WHERE campaign_id = ?
        "#,
    )
    .bind(campaign_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
