//! IMAP client operations: connection, mailbox selection, window fetch and logout.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_imap::types::{Fetch, Flag};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_util::compat::TokioAsyncReadCompatExt;

use super::{ImapClient, ImapSession, XOAuth2Authenticator};
use crate::mail::session::MailSession;
use crate::mail::types::{FetchAttributes, FetchedMessage, MailboxStatus};
use crate::sync::FetchWindow;

/// Items requested for every message in a window. Gmail extension
/// attributes are only requested when the server is known to support them.
/// The header section is cut from `BODY[]` rather than fetched separately.
const FETCH_ITEMS: &str = "(UID FLAGS INTERNALDATE BODY.PEEK[])";
const FETCH_ITEMS_GMAIL: &str = "(UID FLAGS INTERNALDATE X-GM-MSGID X-GM-LABELS BODY.PEEK[])";

/// rustls client configuration trusting the webpki root set.
pub(super) fn tls_config() -> Result<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .context("Failed to configure TLS protocol versions")?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(config)
}

impl ImapClient {
    //
    // Connection Management
    //

    pub async fn connect(&mut self, tls: Arc<rustls::ClientConfig>) -> Result<()> {
        let addr = format!("{}:{}", self.config.server, self.config.port);
        let connect_timeout = Duration::from_secs(self.config.connect_timeout_secs);

        let tcp = timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| anyhow!("Timed out connecting to {}", addr))?
            .with_context(|| format!("Failed to connect to {}", addr))?;

        let server_name = ServerName::try_from(self.config.server.clone())
            .map_err(|e| anyhow!("Invalid server name '{}': {}", self.config.server, e))?;

        let tls_stream = timeout(
            connect_timeout,
            TlsConnector::from(tls).connect(server_name, tcp),
        )
        .await
        .map_err(|_| anyhow!("TLS handshake with {} timed out", addr))?
        .context("TLS handshake failed")?;

        // Wrap tokio stream with compat layer for futures-io compatibility
        let client = async_imap::Client::new(tls_stream.compat());

        let authenticator = XOAuth2Authenticator {
            user: self.username.clone(),
            access_token: self.access_token.clone(),
        };
        let session = timeout(
            Duration::from_secs(self.config.auth_timeout_secs),
            client.authenticate("XOAUTH2", authenticator),
        )
        .await
        .map_err(|_| anyhow!("XOAUTH2 authentication timed out"))?
        .map_err(|e| anyhow!("XOAUTH2 authentication failed: {:?}", e.0))?;

        self.session = Some(session);
        tracing::info!(server = %self.config.server, "Connected to IMAP server");

        Ok(())
    }

    pub async fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.logout().await {
                tracing::debug!("IMAP logout failed: {:?}", e);
            }
            tracing::debug!(server = %self.config.server, "IMAP session closed");
        }
    }

    pub(crate) fn session(&mut self) -> Result<&mut ImapSession> {
        self.session
            .as_mut()
            .context("Not connected to IMAP server")
    }

    //
    // Mailbox Operations
    //

    pub async fn examine(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        let selected = self
            .session()?
            .examine(mailbox)
            .await
            .with_context(|| format!("Failed to examine mailbox '{}'", mailbox))?;
        Ok(MailboxStatus {
            total_messages: selected.exists,
        })
    }

    pub async fn select(&mut self, mailbox: &str) -> Result<MailboxStatus> {
        let selected = self
            .session()?
            .select(mailbox)
            .await
            .with_context(|| format!("Failed to select mailbox '{}'", mailbox))?;
        Ok(MailboxStatus {
            total_messages: selected.exists,
        })
    }

    //
    // Fetch Operations
    //

    pub async fn fetch_window(&mut self, window: FetchWindow) -> Result<Vec<FetchedMessage>> {
        let items = if self.config.gmail_extensions {
            FETCH_ITEMS_GMAIL
        } else {
            FETCH_ITEMS
        };
        let session = self.session()?;

        let mut fetches = session
            .fetch(window.sequence_set(), items)
            .await
            .with_context(|| format!("Failed to fetch messages {}", window))?;

        let mut messages = Vec::with_capacity(window.len() as usize);
        while let Some(result) = fetches.next().await {
            let fetch = result.with_context(|| format!("Failed to fetch message in {}", window))?;
            messages.push(fetched_message(&fetch));
        }

        tracing::debug!(window = %window, count = messages.len(), "Fetched window");
        Ok(messages)
    }
}

impl MailSession for ImapClient {
    async fn select_mailbox(&mut self, name: &str, read_only: bool) -> Result<MailboxStatus> {
        if read_only {
            self.examine(name).await
        } else {
            self.select(name).await
        }
    }

    async fn fetch_range(&mut self, window: FetchWindow) -> Result<Vec<FetchedMessage>> {
        self.fetch_window(window).await
    }

    async fn close(&mut self) {
        self.disconnect().await;
    }
}

/// Convert a FETCH response into raw header/body bytes plus attributes.
pub(crate) fn fetched_message(fetch: &Fetch) -> FetchedMessage {
    let flags = fetch.flags().map(|flag| flag_name(&flag)).collect();
    let labels: Option<Vec<&str>> = fetch
        .gmail_labels()
        .map(|labels| labels.iter().map(|label| &**label).collect());
    let raw_body = fetch.body().map(<[u8]>::to_vec).unwrap_or_default();

    FetchedMessage {
        attributes: fetch_attributes(
            fetch.message,
            fetch.uid,
            fetch.gmail_msg_id().copied(),
            labels.as_deref(),
            flags,
            fetch.internal_date().map(|d| d.with_timezone(&Utc)),
        ),
        raw_header: header_section(&raw_body).to_vec(),
        raw_body,
    }
}

/// Attributes of one fetched message.
///
/// async-imap has no accessor for X-GM-THRID, so `thread_id`
/// is left empty and the parser falls back to the message id.
pub(crate) fn fetch_attributes(
    sequence: u32,
    uid: Option<u32>,
    gmail_msg_id: Option<u64>,
    labels: Option<&[&str]>,
    flags: Vec<String>,
    internal_date: Option<DateTime<Utc>>,
) -> FetchAttributes {
    FetchAttributes {
        sequence,
        uid,
        provider_message_id: gmail_msg_id.map(|id| id.to_string()),
        thread_id: None,
        flags,
        labels: labels
            .map(|labels| labels.iter().map(|label| label.to_string()).collect())
            .unwrap_or_default(),
        internal_date,
    }
}

/// Header section of a full message, up to and including the blank line.
/// A message without a body is all header.
pub(crate) fn header_section(source: &[u8]) -> &[u8] {
    source
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| &source[..pos + 4])
        .or_else(|| {
            source
                .windows(2)
                .position(|w| w == b"\n\n")
                .map(|pos| &source[..pos + 2])
        })
        .unwrap_or(source)
}

/// Server spelling of a flag, e.g. `\Seen`.
pub(crate) fn flag_name(flag: &Flag<'_>) -> String {
    match flag {
        Flag::Seen => "\\Seen".to_string(),
        Flag::Answered => "\\Answered".to_string(),
        Flag::Flagged => "\\Flagged".to_string(),
        Flag::Deleted => "\\Deleted".to_string(),
        Flag::Draft => "\\Draft".to_string(),
        Flag::Recent => "\\Recent".to_string(),
        Flag::MayCreate => "\\*".to_string(),
        Flag::Custom(name) => name.to_string(),
        #[allow(unreachable_patterns)]
        other => format!("{:?}", other),
    }
}
