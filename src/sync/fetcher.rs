//! Sequential window walk over an open session.

use super::dedup::{Admission, DedupGate};
use super::window::{FetchWindow, WindowCoverage, WindowWalk};
use crate::cache::MessageStore;
use crate::config::SyncConfig;
use crate::error::MailError;
use crate::mail::parser::parse_message;
use crate::mail::session::MailSession;
use crate::mail::types::FetchedMessage;

/// Aggregate result of one sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Messages newly written during this sync.
    pub synced: usize,
    /// Messages in the mailbox when it was selected.
    pub total: u32,
}

#[derive(Debug, Default)]
struct WindowTally {
    inserted: usize,
    duplicates: usize,
    failed: usize,
}

pub struct BatchFetcher {
    window_size: u32,
    coverage: WindowCoverage,
}

impl BatchFetcher {
    pub fn new(window_size: u32, coverage: WindowCoverage) -> Self {
        Self {
            window_size: window_size.max(1),
            coverage,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.window_size, config.coverage)
    }

    /// Walk the mailbox newest first, finishing each window before
    /// requesting the next.
    ///
    /// Messages that fail to parse or persist are logged and skipped. A
    /// failed FETCH ends the walk with `SyncFailure`; messages already
    /// written stay written.
    pub async fn walk<S, M>(
        &self,
        session: &mut S,
        store: &M,
        user_id: i64,
        total: u32,
    ) -> Result<SyncSummary, MailError>
    where
        S: MailSession,
        M: MessageStore,
    {
        let gate = DedupGate::new(store);
        let mut summary = SyncSummary { synced: 0, total };

        for window in WindowWalk::new(total, self.window_size, self.coverage) {
            let messages = session.fetch_range(window).await.map_err(|e| {
                MailError::sync(e.context(format!("Failed to fetch window {}", window)))
            })?;

            let tally = self
                .process_window(&gate, user_id, window, &messages)
                .await?;
            summary.synced += tally.inserted;

            tracing::info!(
                "Window {} complete: {} new, {} already stored, {} failed",
                window,
                tally.inserted,
                tally.duplicates,
                tally.failed
            );
        }

        Ok(summary)
    }

    async fn process_window<M: MessageStore>(
        &self,
        gate: &DedupGate<'_, M>,
        user_id: i64,
        window: FetchWindow,
        messages: &[FetchedMessage],
    ) -> Result<WindowTally, MailError> {
        let mut tally = WindowTally::default();

        for message in messages {
            match Self::process_message(gate, user_id, message).await {
                Ok(Admission::Inserted(id)) => {
                    tracing::debug!("Stored message #{} as row {}", message.attributes.sequence, id);
                    tally.inserted += 1;
                }
                Ok(Admission::Duplicate) => tally.duplicates += 1,
                Err(e) if e.is_per_message() => {
                    tracing::warn!(
                        "Skipping message #{} in window {}: {}",
                        message.attributes.sequence,
                        window,
                        e
                    );
                    tally.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(tally)
    }

    async fn process_message<M: MessageStore>(
        gate: &DedupGate<'_, M>,
        user_id: i64,
        message: &FetchedMessage,
    ) -> Result<Admission, MailError> {
        let record = parse_message(
            user_id,
            &message.attributes,
            &message.raw_header,
            &message.raw_body,
        )?;
        gate.admit(&record).await
    }
}
