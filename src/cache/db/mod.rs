//! SQLite store for users, credentials, messages and sync watermarks.
//!
//! This module is split into:
//! - `mod.rs` - Database struct, connection pool, trait implementations
//! - `schema.rs` - Database schema initialization and migrations
//! - `user.rs` - User, credential and watermark operations
//! - `email.rs` - Message CRUD operations

mod email;
mod schema;
mod user;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use super::{CredentialStore, InsertOutcome, MessageFilter, MessageQuery, MessageStore, SyncWatermark};
use crate::mail::types::{MailboxCredential, MessageRecord, StoredMessage};

/// Connection pool size. Independent users' syncs may run concurrently
/// against the same store.
const POOL_SIZE: u32 = 8;

/// A user as returned by a successful authorization.
#[derive(Debug, Clone)]
pub struct AuthorizedUser {
    pub google_id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

pub(crate) fn from_timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

pub(crate) fn from_timestamp_or_epoch(secs: i64) -> DateTime<Utc> {
    from_timestamp(secs).unwrap_or_default()
}

/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn open(path: &Path) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", path.display());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect_with(options)
            .await
            .context("Failed to create connection pool")?;

        schema::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to create in-memory connection pool")?;

        schema::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    //
    // User Operations
    //

    pub async fn upsert_authorized_user(&self, user: &AuthorizedUser) -> Result<(i64, bool)> {
        user::upsert_authorized_user(&self.pool, user).await
    }

    pub async fn deactivate_user(&self, user_id: i64) -> Result<bool> {
        user::deactivate_user(&self.pool, user_id).await
    }

    pub async fn get_watermark(&self, user_id: i64) -> Result<Option<SyncWatermark>> {
        user::get_watermark(&self.pool, user_id).await
    }
}

impl CredentialStore for Database {
    async fn get_credential(&self, user_id: i64) -> Result<Option<MailboxCredential>> {
        user::get_credential(&self.pool, user_id).await
    }

    async fn update_access_token(
        &self,
        user_id: i64,
        access_token: &str,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<()> {
        user::update_access_token(&self.pool, user_id, access_token, expiry).await
    }

    async fn record_sync(&self, watermark: SyncWatermark) -> Result<()> {
        user::set_last_sync(&self.pool, watermark).await
    }
}

impl MessageStore for Database {
    async fn find_by_user_and_message_id(
        &self,
        user_id: i64,
        message_id: &str,
    ) -> Result<Option<StoredMessage>> {
        email::find_by_user_and_message_id(&self.pool, user_id, message_id).await
    }

    async fn insert(&self, record: &MessageRecord) -> Result<InsertOutcome> {
        email::insert_message(&self.pool, record).await
    }

    async fn count_by_user(&self, user_id: i64, filter: &MessageFilter) -> Result<u64> {
        email::count_by_user(&self.pool, user_id, filter).await
    }

    async fn update_read_flag(&self, id: i64, is_read: bool) -> Result<()> {
        email::update_read_flag(&self.pool, id, is_read).await
    }

    async fn query_page(&self, user_id: i64, query: &MessageQuery) -> Result<Vec<StoredMessage>> {
        email::query_page(&self.pool, user_id, query).await
    }

    async fn get_for_user(&self, user_id: i64, id: i64) -> Result<Option<StoredMessage>> {
        email::get_for_user(&self.pool, user_id, id).await
    }
}
