//! User and credential operations.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{from_timestamp, AuthorizedUser};
use crate::cache::SyncWatermark;
use crate::mail::types::MailboxCredential;

fn row_to_credential(row: SqliteRow) -> MailboxCredential {
    MailboxCredential {
        user_id: row.get("id"),
        email: row.get("email"),
        access_token: row.get("access_token"),
        refresh_token: row
            .get::<Option<String>, _>("refresh_token")
            .filter(|token| !token.is_empty()),
        expiry: row
            .get::<Option<i64>, _>("token_expiry")
            .and_then(from_timestamp),
        is_active: row.get("is_active"),
    }
}

pub async fn get_credential(pool: &SqlitePool, user_id: i64) -> Result<Option<MailboxCredential>> {
    let row = sqlx::query(
        "SELECT id, email, access_token, refresh_token, token_expiry, is_active FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(row_to_credential))
}

pub async fn update_access_token(
    pool: &SqlitePool,
    user_id: i64,
    access_token: &str,
    expiry: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        "UPDATE users SET access_token = ?, token_expiry = ?, updated_at = ? WHERE id = ?",
    )
    .bind(access_token)
    .bind(expiry.map(|e| e.timestamp()))
    .bind(Utc::now().timestamp())
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_last_sync(pool: &SqlitePool, watermark: SyncWatermark) -> Result<()> {
    sqlx::query("UPDATE users SET last_sync_at = ?, updated_at = ? WHERE id = ?")
        .bind(watermark.last_sync_at.timestamp())
        .bind(Utc::now().timestamp())
        .bind(watermark.user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_watermark(pool: &SqlitePool, user_id: i64) -> Result<Option<SyncWatermark>> {
    let last_sync: Option<Option<i64>> =
        sqlx::query_scalar("SELECT last_sync_at FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(last_sync
        .flatten()
        .and_then(from_timestamp)
        .map(|at| SyncWatermark::new(user_id, at)))
}

/// Insert a newly authorized user or refresh an existing one's tokens,
/// keyed on the provider account id. Returns the user id and whether the
/// row was created.
pub async fn upsert_authorized_user(pool: &SqlitePool, user: &AuthorizedUser) -> Result<(i64, bool)> {
    let now = Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE google_id = ?")
        .bind(&user.google_id)
        .fetch_optional(&mut *tx)
        .await?;

    let result = match existing {
        Some(id) => {
            // A re-consent without a new refresh token keeps the stored one.
            sqlx::query(
                r#"
                UPDATE users
                SET email = ?, name = ?, picture = ?, access_token = ?,
                    refresh_token = COALESCE(?, refresh_token), token_expiry = ?,
                    is_active = 1, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.picture)
            .bind(&user.access_token)
            .bind(&user.refresh_token)
            .bind(user.expiry.map(|e| e.timestamp()))
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            (id, false)
        }
        None => {
            let inserted = sqlx::query(
                r#"
                INSERT INTO users
                (google_id, email, name, picture, access_token, refresh_token, token_expiry, is_active, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
                "#,
            )
            .bind(&user.google_id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.picture)
            .bind(&user.access_token)
            .bind(&user.refresh_token)
            .bind(user.expiry.map(|e| e.timestamp()))
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            (inserted.last_insert_rowid(), true)
        }
    };

    tx.commit().await?;
    Ok(result)
}

/// Clear tokens and mark the user inactive. Returns false for unknown users.
pub async fn deactivate_user(pool: &SqlitePool, user_id: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET access_token = '', refresh_token = '', token_expiry = NULL,
            is_active = 0, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(Utc::now().timestamp())
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
