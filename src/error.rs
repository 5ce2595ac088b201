//! Error taxonomy for mailbox synchronization and mailbox queries.
//!
//! Collaborators (stores, token endpoint, IMAP transport) report `anyhow`
//! errors; they are classified here at the engine boundary so callers see a
//! single typed failure with the underlying cause attached as its source.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum MailError {
    /// Unknown user or message.
    #[error("{0} not found")]
    NotFound(String),

    /// Expired, invalid or revoked credential, or a rejected refresh.
    #[error("authentication failed: {0}")]
    AuthFailure(#[source] BoxError),

    /// Session open, TLS negotiation, login or mailbox selection failed.
    #[error("connection failed: {0}")]
    ConnectionFailure(#[source] BoxError),

    /// A window-level protocol error aborted the remaining walk.
    #[error("sync failed: {0}")]
    SyncFailure(#[source] BoxError),

    /// A single message could not be parsed. Absorbed by the batch fetcher.
    #[error("failed to parse message: {0}")]
    ParseFailure(String),

    /// A single message could not be checked or written. Absorbed by the batch fetcher.
    #[error("failed to persist message: {0}")]
    PersistFailure(#[source] BoxError),

    /// Storage failure outside the per-message path (credential load, watermark, queries).
    #[error("storage error: {0}")]
    Storage(#[source] BoxError),
}

impl MailError {
    pub fn auth(cause: impl Into<BoxError>) -> Self {
        Self::AuthFailure(cause.into())
    }

    pub fn connection(cause: impl Into<BoxError>) -> Self {
        Self::ConnectionFailure(cause.into())
    }

    pub fn sync(cause: impl Into<BoxError>) -> Self {
        Self::SyncFailure(cause.into())
    }

    pub fn persist(cause: impl Into<BoxError>) -> Self {
        Self::PersistFailure(cause.into())
    }

    pub fn storage(cause: impl Into<BoxError>) -> Self {
        Self::Storage(cause.into())
    }

    /// Per-message failures are logged and skipped; everything else is fatal.
    pub fn is_per_message(&self) -> bool {
        matches!(self, Self::ParseFailure(_) | Self::PersistFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anyhow_cause_is_kept_as_source() {
        let err = MailError::connection(anyhow::anyhow!("TLS handshake failed"));
        assert_eq!(err.to_string(), "connection failed: TLS handshake failed");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "TLS handshake failed");
    }

    #[test]
    fn test_per_message_classification() {
        assert!(MailError::ParseFailure("empty".into()).is_per_message());
        assert!(MailError::persist("disk full").is_per_message());
        assert!(!MailError::sync("BAD fetch").is_per_message());
        assert!(!MailError::NotFound("user 7".into()).is_per_message());
    }
}
