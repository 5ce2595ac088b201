//! Message CRUD operations.

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::from_timestamp_or_epoch;
use crate::cache::{InsertOutcome, MessageFilter, MessageQuery};
use crate::mail::types::{MessageRecord, StoredMessage};

const MESSAGE_COLUMNS: &str = "id, user_id, message_id, thread_id, subject, from_addr, to_addr, cc_addr, bcc_addr, body_text, body_html, date, has_attachments, is_read, labels, snippet, created_at";

/// Convert a SQLite row to a StoredMessage.
fn row_to_message(row: SqliteRow) -> StoredMessage {
    let labels: String = row.get("labels");
    StoredMessage {
        id: row.get("id"),
        record: MessageRecord {
            user_id: row.get("user_id"),
            message_id: row.get("message_id"),
            thread_id: row.get("thread_id"),
            subject: row.get("subject"),
            from: row.get("from_addr"),
            to: row.get("to_addr"),
            cc: row.get::<Option<String>, _>("cc_addr").unwrap_or_default(),
            bcc: row.get::<Option<String>, _>("bcc_addr").unwrap_or_default(),
            body_text: row.get::<Option<String>, _>("body_text").unwrap_or_default(),
            body_html: row.get::<Option<String>, _>("body_html").unwrap_or_default(),
            date: from_timestamp_or_epoch(row.get("date")),
            has_attachments: row.get("has_attachments"),
            is_read: row.get("is_read"),
            labels: serde_json::from_str(&labels).unwrap_or_default(),
            snippet: row.get::<Option<String>, _>("snippet").unwrap_or_default(),
        },
        created_at: from_timestamp_or_epoch(row.get("created_at")),
    }
}

/// WHERE clause for a user's messages under `filter`, with its bind values
/// (after the leading user id) in order.
fn filter_clause(filter: &MessageFilter) -> (String, Vec<String>) {
    let mut clause = String::from("user_id = ?");
    let mut binds = Vec::new();

    if filter.unread_only {
        clause.push_str(" AND is_read = 0");
    }

    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        clause.push_str(
            " AND (subject LIKE ? OR from_addr LIKE ? OR to_addr LIKE ? OR body_text LIKE ?)",
        );
        let pattern = format!("%{}%", search.trim());
        binds.extend(std::iter::repeat_n(pattern, 4));
    }

    (clause, binds)
}

pub async fn find_by_user_and_message_id(
    pool: &SqlitePool,
    user_id: i64,
    message_id: &str,
) -> Result<Option<StoredMessage>> {
    let sql = format!(
        "SELECT {} FROM emails WHERE user_id = ? AND message_id = ?",
        MESSAGE_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(message_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(row_to_message))
}

/// Insert a message unless its dedup key is already present.
pub async fn insert_message(pool: &SqlitePool, record: &MessageRecord) -> Result<InsertOutcome> {
    let now = Utc::now().timestamp();
    let labels = serde_json::to_string(&record.labels)?;

    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO emails
        (user_id, message_id, thread_id, subject, from_addr, to_addr, cc_addr, bcc_addr, body_text, body_html, date, has_attachments, is_read, labels, snippet, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.user_id)
    .bind(&record.message_id)
    .bind(&record.thread_id)
    .bind(&record.subject)
    .bind(&record.from)
    .bind(&record.to)
    .bind(&record.cc)
    .bind(&record.bcc)
    .bind(&record.body_text)
    .bind(&record.body_html)
    .bind(record.date.timestamp())
    .bind(record.has_attachments)
    .bind(record.is_read)
    .bind(labels)
    .bind(&record.snippet)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        Ok(InsertOutcome::AlreadyPresent)
    } else {
        Ok(InsertOutcome::Inserted(result.last_insert_rowid()))
    }
}

pub async fn count_by_user(pool: &SqlitePool, user_id: i64, filter: &MessageFilter) -> Result<u64> {
    let (clause, binds) = filter_clause(filter);
    let sql = format!("SELECT COUNT(*) FROM emails WHERE {}", clause);

    let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(user_id);
    for value in binds {
        query = query.bind(value);
    }

    let count = query.fetch_one(pool).await?;
    Ok(count as u64)
}

pub async fn update_read_flag(pool: &SqlitePool, id: i64, is_read: bool) -> Result<()> {
    sqlx::query("UPDATE emails SET is_read = ?, updated_at = ? WHERE id = ?")
        .bind(is_read)
        .bind(Utc::now().timestamp())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// A page of messages ordered newest first (ties broken by row id).
pub async fn query_page(
    pool: &SqlitePool,
    user_id: i64,
    page: &MessageQuery,
) -> Result<Vec<StoredMessage>> {
    let (clause, binds) = filter_clause(&page.filter);
    let sql = format!(
        "SELECT {} FROM emails WHERE {} ORDER BY date DESC, id DESC LIMIT ? OFFSET ?",
        MESSAGE_COLUMNS, clause
    );

    let mut query = sqlx::query(&sql).bind(user_id);
    for value in binds {
        query = query.bind(value);
    }

    let rows = query
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(row_to_message).collect())
}

pub async fn get_for_user(pool: &SqlitePool, user_id: i64, id: i64) -> Result<Option<StoredMessage>> {
    let sql = format!(
        "SELECT {} FROM emails WHERE id = ? AND user_id = ?",
        MESSAGE_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(row_to_message))
}
