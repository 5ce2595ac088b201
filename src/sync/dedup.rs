//! The only write path for synced messages.

use crate::cache::{InsertOutcome, MessageStore};
use crate::error::MailError;
use crate::mail::types::MessageRecord;

/// What happened to a candidate record at the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Written with the given row id.
    Inserted(i64),
    /// Already stored for this user; nothing written.
    Duplicate,
}

/// Checks the store for an existing (user id, message id) before inserting.
///
/// The check and the insert are not atomic. Two overlapping syncs for one
/// user can both pass the check; the store's unique constraint then turns
/// the losing insert into a `Duplicate`.
pub struct DedupGate<'a, M> {
    store: &'a M,
}

impl<'a, M: MessageStore> DedupGate<'a, M> {
    pub fn new(store: &'a M) -> Self {
        Self { store }
    }

    pub async fn admit(&self, record: &MessageRecord) -> Result<Admission, MailError> {
        let existing = self
            .store
            .find_by_user_and_message_id(record.user_id, &record.message_id)
            .await
            .map_err(MailError::persist)?;

        if existing.is_some() {
            tracing::debug!("Skipping already stored message {}", record.message_id);
            return Ok(Admission::Duplicate);
        }

        match self.store.insert(record).await.map_err(MailError::persist)? {
            InsertOutcome::Inserted(id) => Ok(Admission::Inserted(id)),
            InsertOutcome::AlreadyPresent => {
                tracing::debug!("Message {} was stored concurrently", record.message_id);
                Ok(Admission::Duplicate)
            }
        }
    }
}
