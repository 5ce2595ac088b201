//! IMAP session manager for mailbox synchronization.
//!
//! This module is split into:
//! - `mod.rs` - Types, authenticator, connector and public API
//! - `client.rs` - Connection, mailbox selection, window fetch and logout

mod client;

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_util::compat::Compat;

use crate::config::ImapConfig;
use crate::oauth2::xoauth2_payload;

use super::session::SessionOpener;

/// XOAUTH2 authenticator for IMAP
pub(crate) struct XOAuth2Authenticator {
    pub user: String,
    pub access_token: String,
}

impl async_imap::Authenticator for XOAuth2Authenticator {
    type Response = String;

    fn process(&mut self, _challenge: &[u8]) -> Self::Response {
        // async-imap base64-encodes the response
        xoauth2_payload(&self.user, &self.access_token)
    }
}

pub(crate) type ImapSession = async_imap::Session<Compat<TlsStream<TcpStream>>>;

/// One authenticated IMAP connection.
pub struct ImapClient {
    pub(crate) session: Option<ImapSession>,
    pub config: ImapConfig,
    pub username: String,
    pub(crate) access_token: String,
}

impl ImapClient {
    pub fn new(config: ImapConfig, username: String, access_token: String) -> Self {
        Self {
            session: None,
            config,
            username,
            access_token,
        }
    }
}

/// Opens XOAUTH2-authenticated IMAP sessions against the configured server.
#[derive(Clone)]
pub struct ImapConnector {
    config: ImapConfig,
    tls: Arc<rustls::ClientConfig>,
}

impl ImapConnector {
    pub fn new(config: ImapConfig) -> Result<Self> {
        Ok(Self {
            tls: Arc::new(client::tls_config()?),
            config,
        })
    }
}

impl SessionOpener for ImapConnector {
    type Session = ImapClient;

    async fn open(&self, identity: &str, access_token: &str) -> Result<ImapClient> {
        let mut client = ImapClient::new(
            self.config.clone(),
            identity.to_string(),
            access_token.to_string(),
        );
        client.connect(Arc::clone(&self.tls)).await?;
        Ok(client)
    }
}
