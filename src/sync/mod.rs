//! Mailbox synchronization.
//!
//! One sync runs refresh, session open, the window walk and the watermark
//! update in order:
//! - `refresh.rs` - Access token validation and refresh
//! - `session.rs` - Session open and read-only mailbox selection
//! - `window.rs` - Window arithmetic for the walk
//! - `fetcher.rs` - Sequential window walk, parse and persist
//! - `dedup.rs` - Check-then-insert gate in front of the message store

mod dedup;
mod fetcher;
mod refresh;
mod session;
mod window;

#[cfg(test)]
mod testing;

use chrono::{DateTime, Utc};
use std::fmt;

use crate::cache::{CredentialStore, MessageStore, SyncWatermark};
use crate::config::Config;
use crate::error::MailError;
use crate::mail::session::{MailSession, SessionOpener};

pub use fetcher::{BatchFetcher, SyncSummary};
pub use refresh::{CredentialRefresher, TokenGrant, TokenProvider};
pub use session::SessionManager;
pub use window::{FetchWindow, WindowCoverage};

/// Where a sync attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    CredentialValid,
    SessionOpen,
    Fetching,
    Completed,
    Failed,
}

impl SyncPhase {
    /// Forward transitions only; any phase short of `Completed` may fail.
    pub fn can_advance_to(self, next: SyncPhase) -> bool {
        use SyncPhase::*;
        matches!(
            (self, next),
            (Idle, CredentialValid)
                | (CredentialValid, SessionOpen)
                | (SessionOpen, Fetching)
                | (Fetching, Completed)
                | (Idle | CredentialValid | SessionOpen | Fetching, Failed)
        )
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::CredentialValid => "credential-valid",
            SyncPhase::SessionOpen => "session-open",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Completed => "completed",
            SyncPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Phase tracking for one attempt.
struct SyncRun {
    user_id: i64,
    phase: SyncPhase,
}

impl SyncRun {
    fn new(user_id: i64) -> Self {
        Self {
            user_id,
            phase: SyncPhase::Idle,
        }
    }

    fn advance(&mut self, next: SyncPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "invalid sync transition {} -> {}",
            self.phase,
            next
        );
        tracing::debug!("Sync for user {}: {} -> {}", self.user_id, self.phase, next);
        self.phase = next;
    }

    fn fail(&mut self, err: MailError) -> MailError {
        tracing::error!(
            "Sync for user {} failed during {}: {}",
            self.user_id,
            self.phase,
            err
        );
        self.advance(SyncPhase::Failed);
        err
    }
}

/// Runs syncs for any user against shared collaborators.
///
/// Syncs for different users are independent. Overlapping syncs for the
/// same user are not serialized; the dedup gate plus the store's unique
/// constraint keep them from storing a message twice.
pub struct SyncEngine<S, P, O> {
    store: S,
    refresher: CredentialRefresher<P>,
    sessions: SessionManager<O>,
    fetcher: BatchFetcher,
}

impl<S, P, O> SyncEngine<S, P, O>
where
    S: CredentialStore + MessageStore,
    P: TokenProvider,
    O: SessionOpener,
{
    pub fn new(
        store: S,
        refresher: CredentialRefresher<P>,
        sessions: SessionManager<O>,
        fetcher: BatchFetcher,
    ) -> Self {
        Self {
            store,
            refresher,
            sessions,
            fetcher,
        }
    }

    pub fn from_config(store: S, provider: P, opener: O, config: &Config) -> Self {
        Self::new(
            store,
            CredentialRefresher::new(provider),
            SessionManager::new(opener, config.imap.mailbox.clone()),
            BatchFetcher::from_config(&config.sync),
        )
    }

    pub async fn sync(&self, user_id: i64) -> Result<SyncSummary, MailError> {
        self.sync_at(user_id, Utc::now()).await
    }

    /// Sync as of `now`, which decides whether the stored token has expired.
    pub async fn sync_at(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<SyncSummary, MailError> {
        let mut run = SyncRun::new(user_id);

        let credential = match self.store.get_credential(user_id).await {
            Ok(Some(credential)) => credential,
            Ok(None) => return Err(run.fail(MailError::NotFound(format!("user {}", user_id)))),
            Err(e) => return Err(run.fail(MailError::storage(e))),
        };

        let access_token = match self
            .refresher
            .ensure_valid(&self.store, &credential, now)
            .await
        {
            Ok(token) => token,
            Err(e) => return Err(run.fail(e)),
        };
        run.advance(SyncPhase::CredentialValid);

        let mut open = match self.sessions.open(&credential.email, &access_token).await {
            Ok(open) => open,
            Err(e) => return Err(run.fail(e)),
        };
        run.advance(SyncPhase::SessionOpen);

        run.advance(SyncPhase::Fetching);
        let walked = self
            .fetcher
            .walk(&mut open.session, &self.store, user_id, open.total)
            .await;
        open.session.close().await;

        let summary = match walked {
            Ok(summary) => summary,
            Err(e) => return Err(run.fail(e)),
        };

        if let Err(e) = self
            .store
            .record_sync(SyncWatermark::new(user_id, Utc::now()))
            .await
        {
            return Err(run.fail(MailError::storage(e)));
        }
        run.advance(SyncPhase::Completed);

        tracing::info!(
            "Sync for user {} finished: {}/{} messages stored",
            user_id,
            summary.synced,
            summary.total
        );
        Ok(summary)
    }
}
