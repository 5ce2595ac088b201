//! Opening and selecting the mailbox for one sync attempt.

use crate::error::MailError;
use crate::mail::session::{MailSession, SessionOpener};

/// An authenticated session with the mailbox selected read-only.
///
/// The holder must call `close` on the session on every exit path.
pub struct OpenSession<S> {
    pub session: S,
    pub total: u32,
}

pub struct SessionManager<O> {
    opener: O,
    mailbox: String,
}

impl<O: SessionOpener> SessionManager<O> {
    pub fn new(opener: O, mailbox: impl Into<String>) -> Self {
        Self {
            opener,
            mailbox: mailbox.into(),
        }
    }

    /// Authenticate as `identity` and examine the configured mailbox.
    ///
    /// Any failure here is a `ConnectionFailure`. If the mailbox cannot be
    /// selected, the session is closed before returning.
    pub async fn open(
        &self,
        identity: &str,
        access_token: &str,
    ) -> Result<OpenSession<O::Session>, MailError> {
        let mut session = self
            .opener
            .open(identity, access_token)
            .await
            .map_err(MailError::connection)?;

        match session.select_mailbox(&self.mailbox, true).await {
            Ok(status) => {
                tracing::info!(
                    "Opened {} for {} ({} messages)",
                    self.mailbox,
                    identity,
                    status.total_messages
                );
                Ok(OpenSession {
                    session,
                    total: status.total_messages,
                })
            }
            Err(e) => {
                session.close().await;
                Err(MailError::connection(
                    e.context(format!("Failed to open {}", self.mailbox)),
                ))
            }
        }
    }
}
