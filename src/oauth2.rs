//! OAuth2 token endpoint client for Gmail
//!
//! Refreshes expired access tokens for the sync engine, and exchanges an
//! authorization code for tokens when an account is (re-)authorized. The
//! consent redirect itself happens elsewhere; only the resulting code
//! reaches this module.

use anyhow::{Context, Result, bail};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::OAuthConfig;
use crate::constants::HTTP_TIMEOUT_SECS;
use crate::sync::{TokenGrant, TokenProvider};

/// OAuth2 tokens returned by the token endpoint
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuth2Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for OAuth2Tokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Tokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl OAuth2Tokens {
    /// Convert to a grant, resolving `expires_in` against the current time.
    pub fn into_grant(self) -> TokenGrant {
        let expiry = self
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| Utc::now() + Duration::seconds(secs));
        TokenGrant {
            access_token: self.access_token,
            expiry,
        }
    }
}

/// Profile of the account that granted access
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Error response from Google
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorResponse {
    fn unknown() -> Self {
        Self {
            error: "unknown_error".to_string(),
            error_description: None,
        }
    }

    fn message(&self) -> String {
        match &self.error_description {
            Some(desc) => format!("{} ({})", self.error, desc),
            None => self.error.clone(),
        }
    }
}

/// Client for Google's OAuth2 token and userinfo endpoints
pub struct GoogleOAuth2 {
    config: OAuthConfig,
    http_client: reqwest::Client,
}

impl GoogleOAuth2 {
    pub fn new(config: OAuthConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Form parameters for a token request, with client credentials appended.
    fn token_params<'a>(&'a self, grant: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
        let mut params = vec![("client_id", self.config.client_id.as_str())];
        params.extend_from_slice(grant);
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        params
    }

    async fn post_token(&self, params: &[(&str, &str)], action: &str) -> Result<OAuth2Tokens> {
        if self.config.client_id.is_empty() {
            bail!("{} failed: no OAuth client id configured", action);
        }

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(params)
            .send()
            .await
            .with_context(|| format!("{} request failed", action))?;

        if !response.status().is_success() {
            let error: ErrorResponse = response.json().await.unwrap_or_else(|_| ErrorResponse::unknown());
            bail!("{} failed: {}", action, error.message());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", action.to_lowercase()))
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<OAuth2Tokens> {
        let params = self.token_params(&[
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ]);
        self.post_token(&params, "Token exchange").await
    }

    /// Refresh an access token using a refresh token
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuth2Tokens> {
        let params = self.token_params(&[
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]);
        self.post_token(&params, "Token refresh").await
    }

    /// Fetch the profile of the account an access token belongs to
    pub async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo> {
        let response = self
            .http_client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("User info request failed")?;

        if !response.status().is_success() {
            bail!("User info request failed: HTTP {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse user info response")
    }
}

impl TokenProvider for GoogleOAuth2 {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        Ok(self.refresh_access_token(refresh_token).await?.into_grant())
    }
}

/// Build the XOAUTH2 SASL initial response (before base64 encoding)
///
/// Format: "user=" + email + "\x01auth=Bearer " + access_token + "\x01\x01"
pub fn xoauth2_payload(email: &str, access_token: &str) -> String {
    format!("user={}\x01auth=Bearer {}\x01\x01", email, access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oauth(client_secret: Option<&str>) -> GoogleOAuth2 {
        GoogleOAuth2::new(OAuthConfig {
            client_id: "client-id".to_string(),
            client_secret: client_secret.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_xoauth2_payload() {
        assert_eq!(
            xoauth2_payload("user@example.com", "ya29.test_token"),
            "user=user@example.com\x01auth=Bearer ya29.test_token\x01\x01"
        );
    }

    #[test]
    fn test_token_params_include_secret_when_configured() {
        let with_secret = oauth(Some("shh"));
        let params = with_secret.token_params(&[("grant_type", "refresh_token")]);
        assert_eq!(
            params,
            vec![
                ("client_id", "client-id"),
                ("grant_type", "refresh_token"),
                ("client_secret", "shh"),
            ]
        );

        let without = oauth(None);
        let params = without.token_params(&[("grant_type", "refresh_token")]);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_tokens_into_grant() {
        let before = Utc::now();
        let tokens: OAuth2Tokens = serde_json::from_str(
            r#"{"access_token":"ya29.new","expires_in":3599,"token_type":"Bearer"}"#,
        )
        .unwrap();
        assert!(tokens.refresh_token.is_none());

        let grant = tokens.into_grant();
        assert_eq!(grant.access_token, "ya29.new");
        let expiry = grant.expiry.unwrap();
        assert!(expiry >= before + Duration::seconds(3599));
        assert!(expiry <= Utc::now() + Duration::seconds(3599));
    }

    #[test]
    fn test_tokens_without_lifetime_have_no_expiry() {
        let tokens: OAuth2Tokens = serde_json::from_str(r#"{"access_token":"t"}"#).unwrap();
        assert!(tokens.into_grant().expiry.is_none());
    }

    #[test]
    fn test_error_response_message() {
        let error: ErrorResponse = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#,
        )
        .unwrap();
        assert_eq!(
            error.message(),
            "invalid_grant (Token has been expired or revoked.)"
        );
        assert_eq!(ErrorResponse::unknown().message(), "unknown_error");
    }

    #[test]
    fn test_tokens_debug_redacts_secrets() {
        let tokens = OAuth2Tokens {
            access_token: "ya29.secret".to_string(),
            refresh_token: Some("1//secret".to_string()),
            expires_in: Some(3600),
            token_type: None,
        };
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("secret"));
    }

    #[tokio::test]
    async fn test_refresh_without_client_id_fails_before_request() {
        let oauth = GoogleOAuth2::new(OAuthConfig::default()).unwrap();
        let err = oauth.refresh("1//refresh").await.unwrap_err();
        assert!(err.to_string().contains("no OAuth client id"));
    }
}
