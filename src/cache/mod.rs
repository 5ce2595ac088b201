//! Persistence for credentials, messages and sync watermarks.
//!
//! The sync engine only sees the `CredentialStore` and `MessageStore`
//! traits; `Database` is the SQLite implementation of both.

mod db;
mod sync;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::mail::types::{MailboxCredential, MessageRecord, StoredMessage};

pub use db::{AuthorizedUser, Database};
pub use sync::SyncWatermark;

/// Outcome of an insert-if-absent keyed on (user id, message id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    /// A row with the same dedup key already exists; nothing was written.
    AlreadyPresent,
}

/// Restricts counts and listings to a subset of a user's messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pub unread_only: bool,
    /// Substring matched against subject, sender, recipients and text body.
    pub search: Option<String>,
}

impl MessageFilter {
    pub fn unread() -> Self {
        Self {
            unread_only: true,
            search: None,
        }
    }
}

/// One page of a user's messages, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub filter: MessageFilter,
    pub limit: u32,
    pub offset: u32,
}

pub trait CredentialStore {
    async fn get_credential(&self, user_id: i64) -> Result<Option<MailboxCredential>>;

    /// Persist a refreshed access token and its new expiry.
    async fn update_access_token(
        &self,
        user_id: i64,
        access_token: &str,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn record_sync(&self, watermark: SyncWatermark) -> Result<()>;
}

pub trait MessageStore {
    async fn find_by_user_and_message_id(
        &self,
        user_id: i64,
        message_id: &str,
    ) -> Result<Option<StoredMessage>>;

    async fn insert(&self, record: &MessageRecord) -> Result<InsertOutcome>;

    async fn count_by_user(&self, user_id: i64, filter: &MessageFilter) -> Result<u64>;

    async fn update_read_flag(&self, id: i64, is_read: bool) -> Result<()>;

    async fn query_page(&self, user_id: i64, query: &MessageQuery) -> Result<Vec<StoredMessage>>;

    async fn get_for_user(&self, user_id: i64, id: i64) -> Result<Option<StoredMessage>>;
}
