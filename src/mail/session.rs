//! Protocol session seams used by the sync engine.

use anyhow::Result;

use super::types::{FetchedMessage, MailboxStatus};
use crate::sync::FetchWindow;

/// An authenticated mail protocol session.
pub trait MailSession {
    /// Select a mailbox; `read_only` opens it without affecting flags.
    async fn select_mailbox(&mut self, name: &str, read_only: bool) -> Result<MailboxStatus>;

    /// Fetch every message in the window, in server delivery order.
    async fn fetch_range(&mut self, window: FetchWindow) -> Result<Vec<FetchedMessage>>;

    /// End the session. Errors during logout are not reported.
    async fn close(&mut self);
}

/// Opens sessions for a mailbox identity using a bearer token.
pub trait SessionOpener {
    type Session: MailSession;

    async fn open(&self, identity: &str, access_token: &str) -> Result<Self::Session>;
}
