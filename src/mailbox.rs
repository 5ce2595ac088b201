//! Read-side queries over a user's stored messages.

use serde::Serialize;

use crate::cache::{MessageFilter, MessageQuery, MessageStore};
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::error::MailError;
use crate::mail::types::StoredMessage;

/// Listing options; unset fields take their defaults.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// 1-based page number
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub unread_only: bool,
}

impl ListOptions {
    /// Page number and page size after defaults and the size cap.
    pub fn resolve(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .filter(|&limit| limit > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        (page, limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub emails: Vec<StoredMessage>,
    /// Matching messages across all pages
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MailboxStats {
    pub total: u64,
    pub unread: u64,
    pub read: u64,
}

pub struct MailboxService<M> {
    store: M,
}

impl<M: MessageStore> MailboxService<M> {
    pub fn new(store: M) -> Self {
        Self { store }
    }

    /// One page of a user's messages, newest first.
    pub async fn list(&self, user_id: i64, options: &ListOptions) -> Result<MessagePage, MailError> {
        let (page, limit) = options.resolve();
        let filter = MessageFilter {
            unread_only: options.unread_only,
            search: options.search.clone(),
        };

        let total = self
            .store
            .count_by_user(user_id, &filter)
            .await
            .map_err(MailError::storage)?;

        let query = MessageQuery {
            filter,
            limit,
            offset: (page - 1).saturating_mul(limit),
        };
        let emails = self
            .store
            .query_page(user_id, &query)
            .await
            .map_err(MailError::storage)?;

        Ok(MessagePage {
            emails,
            total,
            page,
            limit,
        })
    }

    /// Fetch one message. The first retrieval marks it read.
    pub async fn get(&self, user_id: i64, id: i64) -> Result<StoredMessage, MailError> {
        let mut message = self.find(user_id, id).await?;

        if !message.record.is_read {
            self.store
                .update_read_flag(message.id, true)
                .await
                .map_err(MailError::storage)?;
            message.record.is_read = true;
        }

        Ok(message)
    }

    pub async fn mark_as_read(&self, user_id: i64, id: i64) -> Result<StoredMessage, MailError> {
        let mut message = self.find(user_id, id).await?;

        self.store
            .update_read_flag(message.id, true)
            .await
            .map_err(MailError::storage)?;
        message.record.is_read = true;

        Ok(message)
    }

    pub async fn stats(&self, user_id: i64) -> Result<MailboxStats, MailError> {
        let total = self
            .store
            .count_by_user(user_id, &MessageFilter::default())
            .await
            .map_err(MailError::storage)?;
        let unread = self
            .store
            .count_by_user(user_id, &MessageFilter::unread())
            .await
            .map_err(MailError::storage)?;

        Ok(MailboxStats {
            total,
            unread,
            read: total.saturating_sub(unread),
        })
    }

    async fn find(&self, user_id: i64, id: i64) -> Result<StoredMessage, MailError> {
        self.store
            .get_for_user(user_id, id)
            .await
            .map_err(MailError::storage)?
            .ok_or_else(|| MailError::NotFound(format!("email {}", id)))
    }
}
