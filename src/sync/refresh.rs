//! Access token refresh ahead of session open.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::cache::CredentialStore;
use crate::error::MailError;
use crate::mail::types::MailboxCredential;

/// A freshly issued access token.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expiry: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Exchanges a long-lived refresh token for a new access token.
pub trait TokenProvider {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// Hands out an access token that is safe to present, refreshing it first
/// when the stored one has expired.
pub struct CredentialRefresher<P> {
    provider: P,
}

impl<P: TokenProvider> CredentialRefresher<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Returns the access token to use for a session opened at `now`.
    ///
    /// A refreshed token is written back to `store` before it is returned.
    /// Any refresh failure is an `AuthFailure` and is not retried.
    pub async fn ensure_valid<C: CredentialStore>(
        &self,
        store: &C,
        credential: &MailboxCredential,
        now: DateTime<Utc>,
    ) -> Result<String, MailError> {
        if !credential.is_active {
            return Err(MailError::auth(format!(
                "credential for user {} has been revoked",
                credential.user_id
            )));
        }

        if !credential.is_expired(now) {
            tracing::debug!("Access token for user {} is still valid", credential.user_id);
            return Ok(credential.access_token.clone());
        }

        let refresh_token = credential.refresh_token.as_deref().ok_or_else(|| {
            MailError::auth(format!(
                "access token for user {} expired and no refresh token is stored",
                credential.user_id
            ))
        })?;

        tracing::info!("Access token for user {} expired, refreshing", credential.user_id);
        let grant = self
            .provider
            .refresh(refresh_token)
            .await
            .map_err(MailError::auth)?;

        store
            .update_access_token(credential.user_id, &grant.access_token, grant.expiry)
            .await
            .map_err(MailError::storage)?;

        Ok(grant.access_token)
    }
}
