//! Message log operations.

use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{Message, MessageStatus, MessageType, NewMessage};

const MESSAGE_COLUMNS: &str = "id, campaign_id, contact_id, operator_id, content, message_type, \
     status, provider_sid, scheduled_for, error_code, created_at, updated_at";

/// Outcome of a status update attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The status moved forward; carries the updated message.
    Applied(Message),
    /// The update would not move the status forward and was dropped.
    Ignored { current: MessageStatus },
}

/// Insert a message and return the stored row.
pub async fn create_message(pool: &SqlitePool, message: &NewMessage) -> Result<Message> {
    let message = sqlx::query_as::<_, Message>(&format!(
        r#"
        INSERT INTO messages (
            id, campaign_id, contact_id, operator_id, content,
            message_type, status, provider_sid, scheduled_for
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {}
        "#,
        MESSAGE_COLUMNS
    ))
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&message.campaign_id)
    .bind(&message.contact_id)
    .bind(&message.operator_id)
    .bind(&message.content)
    .bind(message.message_type)
    .bind(message.status)
    .bind(&message.provider_sid)
    .bind(&message.scheduled_for)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DatabaseError::DuplicateMessage {
                    provider_sid: message.provider_sid.clone().unwrap_or_default(),
                };
            }
        }
        DatabaseError::Sqlx(e)
    })?;

    Ok(message)
}

/// Get a message by ID.
pub async fn get_message(pool: &SqlitePool, id: &str) -> Result<Message> {
    sqlx::query_as::<_, Message>(&format!(
        "SELECT {} FROM messages WHERE id = ?",
        MESSAGE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "message",
        id: id.to_string(),
    })
}

/// Get a message by the provider-assigned message id.
pub async fn get_message_by_provider_sid(pool: &SqlitePool, sid: &str) -> Result<Message> {
    sqlx::query_as::<_, Message>(&format!(
        "SELECT {} FROM messages WHERE provider_sid = ?",
        MESSAGE_COLUMNS
    ))
    .bind(sid)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "message",
        id: sid.to_string(),
    })
}

/// Move an outgoing message to `next` if that is a forward transition.
///
/// The write is a compare-and-set on the current status, so two callbacks
/// racing on the same message can never move it backward. Incoming messages
/// keep the status they were received with.
pub async fn advance_status(
    pool: &SqlitePool,
    id: &str,
    next: MessageStatus,
    error_code: Option<i64>,
) -> Result<StatusUpdate> {
    loop {
        let message = get_message(pool, id).await?;
        let current = message.status;
        if message.message_type == MessageType::Incoming || !current.can_advance_to(next) {
            return Ok(StatusUpdate::Ignored { current });
        }

        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = ?,
                error_code = COALESCE(?, error_code),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ? AND status = ? AND message_type = 'outgoing'
            "#,
        )
        .bind(next)
        .bind(error_code)
        .bind(id)
        .bind(current)
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(StatusUpdate::Applied(get_message(pool, id).await?));
        }

        tracing::debug!(message_id = id, "Status changed concurrently, retrying");
    }
}

/// List the conversation with one contact, oldest first.
pub async fn list_messages_for_contact(pool: &SqlitePool, contact_id: &str) -> Result<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(&format!(
        "SELECT {} FROM messages WHERE contact_id = ? ORDER BY created_at, rowid",
        MESSAGE_COLUMNS
    ))
    .bind(contact_id)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}

/// List every message of an operator, newest first.
pub async fn list_messages_for_operator(
    pool: &SqlitePool,
    operator_id: &str,
    limit: i64,
) -> Result<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(&format!(
        "SELECT {} FROM messages WHERE operator_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
        MESSAGE_COLUMNS
    ))
    .bind(operator_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}
