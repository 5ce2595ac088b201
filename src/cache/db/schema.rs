//! Database schema initialization and migrations.

use anyhow::Result;
use sqlx::SqlitePool;

const SCHEMA_VERSION: i64 = 1;

/// Initialize database schema with all tables and indexes.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        -- Users and their mailbox credentials
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            google_id TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            picture TEXT,
            access_token TEXT NOT NULL DEFAULT '',
            refresh_token TEXT,
            token_expiry INTEGER,
            last_sync_at INTEGER,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_users_active ON users(is_active);
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        -- Synced messages. (user_id, message_id) is the dedup key; the
        -- unique constraint backs up the check-then-insert in the sync path.
        CREATE TABLE IF NOT EXISTS emails (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            message_id TEXT NOT NULL,
            thread_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            from_addr TEXT NOT NULL DEFAULT '',
            to_addr TEXT NOT NULL DEFAULT '',
            cc_addr TEXT,
            bcc_addr TEXT,
            body_text TEXT,
            body_html TEXT,
            date INTEGER NOT NULL,
            has_attachments INTEGER NOT NULL DEFAULT 0,
            is_read INTEGER NOT NULL DEFAULT 0,
            labels TEXT NOT NULL DEFAULT '[]',
            snippet TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (user_id, message_id)
        );

        CREATE INDEX IF NOT EXISTS idx_emails_user ON emails(user_id);
        CREATE INDEX IF NOT EXISTS idx_emails_thread ON emails(thread_id);
        CREATE INDEX IF NOT EXISTS idx_emails_user_date ON emails(user_id, date DESC);
        CREATE INDEX IF NOT EXISTS idx_emails_user_read ON emails(user_id, is_read);
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}
