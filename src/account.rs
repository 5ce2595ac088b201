//! Account authorization and logout.

use crate::cache::{AuthorizedUser, Database};
use crate::error::MailError;
use crate::oauth2::{GoogleOAuth2, OAuth2Tokens, UserInfo};

/// Result of a successful authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized {
    pub user_id: i64,
    pub email: String,
    /// False when an existing account was re-authorized.
    pub created: bool,
}

/// Exchange an authorization code and store the account's tokens, creating
/// the user on first authorization.
pub async fn authorize(
    oauth: &GoogleOAuth2,
    db: &Database,
    code: &str,
    redirect_uri: &str,
) -> Result<Authorized, MailError> {
    let tokens = oauth
        .exchange_code(code, redirect_uri)
        .await
        .map_err(MailError::auth)?;
    let info = oauth
        .fetch_user_info(&tokens.access_token)
        .await
        .map_err(MailError::auth)?;

    let user = authorized_user(tokens, info)?;
    let (user_id, created) = db
        .upsert_authorized_user(&user)
        .await
        .map_err(MailError::storage)?;

    tracing::info!(
        "User {} {}",
        user.email,
        if created { "registered" } else { "re-authorized" }
    );

    Ok(Authorized {
        user_id,
        email: user.email,
        created,
    })
}

/// Combine a token response with the account profile. The profile must
/// carry both an account id and an email address.
fn authorized_user(tokens: OAuth2Tokens, info: UserInfo) -> Result<AuthorizedUser, MailError> {
    let (Some(google_id), Some(email)) = (
        info.id.filter(|id| !id.is_empty()),
        info.email.filter(|email| !email.is_empty()),
    ) else {
        return Err(MailError::auth(
            "user info response is missing the account id or email",
        ));
    };

    let refresh_token = tokens.refresh_token.clone();
    let grant = tokens.into_grant();

    Ok(AuthorizedUser {
        name: info
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| email.clone()),
        google_id,
        email,
        picture: info.picture,
        access_token: grant.access_token,
        refresh_token,
        expiry: grant.expiry,
    })
}

/// Clear the user's tokens and mark the account inactive. Unknown users are
/// ignored.
pub async fn logout(db: &Database, user_id: i64) -> Result<(), MailError> {
    if db
        .deactivate_user(user_id)
        .await
        .map_err(MailError::storage)?
    {
        tracing::info!("User {} logged out", user_id);
    } else {
        tracing::debug!("Logout for unknown user {}", user_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CredentialStore;

    fn tokens() -> OAuth2Tokens {
        OAuth2Tokens {
            access_token: "ya29.access".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_in: Some(3600),
            token_type: Some("Bearer".to_string()),
        }
    }

    fn info(id: Option<&str>, email: Option<&str>, name: Option<&str>) -> UserInfo {
        UserInfo {
            id: id.map(str::to_string),
            email: email.map(str::to_string),
            name: name.map(str::to_string),
            picture: None,
        }
    }

    #[test]
    fn test_authorized_user_from_profile() {
        let user = authorized_user(
            tokens(),
            info(Some("1234"), Some("user@example.com"), Some("Ada")),
        )
        .unwrap();

        assert_eq!(user.google_id, "1234");
        assert_eq!(user.email, "user@example.com");
        assert_eq!(user.name, "Ada");
        assert_eq!(user.access_token, "ya29.access");
        assert_eq!(user.refresh_token.as_deref(), Some("1//refresh"));
        assert!(user.expiry.is_some());
    }

    #[test]
    fn test_name_falls_back_to_email() {
        let user = authorized_user(tokens(), info(Some("1234"), Some("user@example.com"), None))
            .unwrap();
        assert_eq!(user.name, "user@example.com");
    }

    #[test]
    fn test_incomplete_profile_is_auth_failure() {
        assert!(matches!(
            authorized_user(tokens(), info(None, Some("user@example.com"), None)),
            Err(MailError::AuthFailure(_))
        ));
        assert!(matches!(
            authorized_user(tokens(), info(Some("1234"), Some(""), None)),
            Err(MailError::AuthFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_revokes_and_ignores_unknown_users() {
        let db = Database::open_in_memory().await.unwrap();
        let user = authorized_user(tokens(), info(Some("1234"), Some("user@example.com"), None))
            .unwrap();
        let (user_id, _) = db.upsert_authorized_user(&user).await.unwrap();

        logout(&db, user_id).await.unwrap();
        logout(&db, user_id + 1).await.unwrap();

        let credential = db.get_credential(user_id).await.unwrap().unwrap();
        assert!(!credential.is_active);
        assert!(credential.access_token.is_empty());
        assert!(credential.refresh_token.is_none());
    }
}
