use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stored OAuth credential for one user's mailbox.
#[derive(Clone)]
pub struct MailboxCredential {
    pub user_id: i64,
    /// Mailbox identity presented in the XOAUTH2 exchange.
    pub email: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl MailboxCredential {
    /// An access token past its expiry must not be presented before a refresh.
    /// A credential without an expiry is treated as valid.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry < now)
    }
}

impl fmt::Debug for MailboxCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxCredential")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expiry", &self.expiry)
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// A normalized message, ready to pass through the dedup gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub user_id: i64,
    /// Provider-assigned id; together with `user_id` this is the dedup key.
    pub message_id: String,
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
    pub body_text: String,
    pub body_html: String,
    pub date: DateTime<Utc>,
    pub is_read: bool,
    pub has_attachments: bool,
    pub labels: Vec<String>,
    pub snippet: String,
}

/// A message as persisted, with its store-assigned row id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    #[serde(flatten)]
    pub record: MessageRecord,
    pub created_at: DateTime<Utc>,
}

/// Protocol-level attributes delivered alongside a fetched message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchAttributes {
    /// Message sequence number within the selected mailbox.
    pub sequence: u32,
    pub uid: Option<u32>,
    /// Provider message id (X-GM-MSGID on Gmail).
    pub provider_message_id: Option<String>,
    /// Provider thread id, when the server supplies one.
    pub thread_id: Option<String>,
    /// Flags as sent by the server, e.g. `\Seen`.
    pub flags: Vec<String>,
    pub labels: Vec<String>,
    pub internal_date: Option<DateTime<Utc>>,
}

impl FetchAttributes {
    /// Seen if either conventional spelling of the flag is present, in any case.
    pub fn is_seen(&self) -> bool {
        self.flags
            .iter()
            .any(|flag| flag.eq_ignore_ascii_case("\\Seen") || flag.eq_ignore_ascii_case("Seen"))
    }
}

/// One message as delivered by a FETCH over a window.
#[derive(Debug, Clone, Default)]
pub struct FetchedMessage {
    pub attributes: FetchAttributes,
    /// Header section, cut from the full source.
    pub raw_header: Vec<u8>,
    /// Full message source (`BODY[]`).
    pub raw_body: Vec<u8>,
}

/// Result of selecting a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxStatus {
    pub total_messages: u32,
}
