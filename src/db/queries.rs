use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::db::now_epoch;
use crate::models::email::{AttachmentMeta, EmailRecord, EmailStatus};

pub const SELECT_COLUMNS: &str = "id, from_addr, to_addr, subject, message, html, attachments, \
     status, message_id, error, sent_at, attempts, created_at, updated_at";

/// Insert a fresh record in `pending` state and return it.
pub async fn create_email(
    pool: &SqlitePool,
    from: &str,
    to: &str,
    subject: &str,
    message: &str,
    html: Option<&str>,
    attachments: &[AttachmentMeta],
) -> Result<EmailRecord, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = now_epoch();

    sqlx::query(
        "INSERT INTO emails (id, from_addr, to_addr, subject, message, html, attachments, \
         status, attempts, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', 0, ?, ?)",
    )
    .bind(&id)
    .bind(from)
    .bind(to)
    .bind(subject)
    .bind(message)
    .bind(html)
    .bind(Json(attachments.to_vec()))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(EmailRecord {
        id,
        from_addr: from.to_string(),
        to_addr: to.to_string(),
        subject: subject.to_string(),
        message: message.to_string(),
        html: html.map(|h| h.to_string()),
        attachments: Json(attachments.to_vec()),
        status: EmailStatus::Pending,
        message_id: None,
        error: None,
        sent_at: None,
        attempts: 0,
        created_at: now,
        updated_at: now,
    })
}

/// Terminal transition to `sent`. Increments `attempts`; exactly one terminal
/// update happens per dispatch.
pub async fn mark_sent(
    pool: &SqlitePool,
    id: &str,
    message_id: &str,
) -> Result<(), sqlx::Error> {
    let now = now_epoch();
    sqlx::query(
        "UPDATE emails SET status = 'sent', message_id = ?, sent_at = ?, error = NULL, \
         attempts = attempts + 1, updated_at = ? WHERE id = ?",
    )
    .bind(message_id)
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Terminal transition to `failed` with the technical error message.
pub async fn mark_failed(pool: &SqlitePool, id: &str, error: &str) -> Result<(), sqlx::Error> {
    let now = now_epoch();
    sqlx::query(
        "UPDATE emails SET status = 'failed', error = ?, attempts = attempts + 1, \
         updated_at = ? WHERE id = ?",
    )
    .bind(error)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_email(pool: &SqlitePool, id: &str) -> Result<Option<EmailRecord>, sqlx::Error> {
    let sql = format!("SELECT {} FROM emails WHERE id = ?", SELECT_COLUMNS);
    sqlx::query_as::<_, EmailRecord>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
}
