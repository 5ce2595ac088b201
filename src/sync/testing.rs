//! In-memory collaborators for exercising the sync pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};

use super::refresh::{TokenGrant, TokenProvider};
use super::window::FetchWindow;
use crate::cache::{
    CredentialStore, InsertOutcome, MessageFilter, MessageQuery, MessageStore, SyncWatermark,
};
use crate::mail::session::{MailSession, SessionOpener};
use crate::mail::types::{
    FetchAttributes, FetchedMessage, MailboxCredential, MailboxStatus, MessageRecord,
    StoredMessage,
};

pub fn credential(user_id: i64, expiry: Option<DateTime<Utc>>) -> MailboxCredential {
    MailboxCredential {
        user_id,
        email: format!("user{}@example.com", user_id),
        access_token: "stored-token".to_string(),
        refresh_token: Some("refresh-token".to_string()),
        expiry,
        is_active: true,
    }
}

pub fn message_record(user_id: i64, message_id: &str) -> MessageRecord {
    MessageRecord {
        user_id,
        message_id: message_id.to_string(),
        thread_id: message_id.to_string(),
        subject: format!("Subject of {}", message_id),
        from: "sender@example.com".to_string(),
        to: "user@example.com".to_string(),
        cc: String::new(),
        bcc: String::new(),
        body_text: "Hello".to_string(),
        body_html: String::new(),
        date: Utc::now(),
        is_read: false,
        has_attachments: false,
        labels: Vec::new(),
        snippet: "Hello".to_string(),
    }
}

/// A fetched message whose header and body sections are both `source`.
pub fn raw_message(sequence: u32, provider_id: Option<&str>, source: &[u8]) -> FetchedMessage {
    FetchedMessage {
        attributes: FetchAttributes {
            sequence,
            uid: Some(1000 + sequence),
            provider_message_id: provider_id.map(str::to_string),
            ..Default::default()
        },
        raw_header: source.to_vec(),
        raw_body: source.to_vec(),
    }
}

fn numbered_message(sequence: u32) -> FetchedMessage {
    let source = format!(
        "From: Sender {n} <sender{n}@example.com>\r\n\
         To: user@example.com\r\n\
         Subject: Message {n}\r\n\
         Message-ID: <msg-{n}@example.com>\r\n\
         Date: Mon, 3 Mar 2025 10:00:00 +0000\r\n\
         \r\n\
         Body of message {n}\r\n",
        n = sequence
    );
    raw_message(sequence, Some(&format!("msg-{}", sequence)), source.as_bytes())
}

//
// Store
//

#[derive(Default)]
struct StoreState {
    credentials: HashMap<i64, MailboxCredential>,
    messages: Vec<StoredMessage>,
    token_updates: Vec<(i64, String, Option<DateTime<Utc>>)>,
    watermarks: Vec<SyncWatermark>,
    inserts: usize,
    racing_inserts: bool,
    failing_insert: Option<String>,
}

/// Credential and message store backed by vectors, in insertion order.
#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<StoreState>>,
}

impl FakeStore {
    fn state(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    pub fn with_credential(self, credential: MailboxCredential) -> Self {
        self.state().credentials.insert(credential.user_id, credential);
        self
    }

    /// Every insert behaves as if another writer stored the row first.
    pub fn racing_inserts(self) -> Self {
        self.state().racing_inserts = true;
        self
    }

    pub fn failing_insert_for(self, message_id: &str) -> Self {
        self.state().failing_insert = Some(message_id.to_string());
        self
    }

    pub fn message_ids(&self, user_id: i64) -> Vec<String> {
        self.state()
            .messages
            .iter()
            .filter(|m| m.record.user_id == user_id)
            .map(|m| m.record.message_id.clone())
            .collect()
    }

    pub fn messages(&self) -> Vec<StoredMessage> {
        self.state().messages.clone()
    }

    pub fn inserts(&self) -> usize {
        self.state().inserts
    }

    pub fn token_updates(&self) -> Vec<(i64, String, Option<DateTime<Utc>>)> {
        self.state().token_updates.clone()
    }

    pub fn watermarks(&self) -> Vec<SyncWatermark> {
        self.state().watermarks.clone()
    }
}

impl CredentialStore for FakeStore {
    async fn get_credential(&self, user_id: i64) -> Result<Option<MailboxCredential>> {
        Ok(self.state().credentials.get(&user_id).cloned())
    }

    async fn update_access_token(
        &self,
        user_id: i64,
        access_token: &str,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut state = self.state();
        state
            .token_updates
            .push((user_id, access_token.to_string(), expiry));
        if let Some(credential) = state.credentials.get_mut(&user_id) {
            credential.access_token = access_token.to_string();
            credential.expiry = expiry;
        }
        Ok(())
    }

    async fn record_sync(&self, watermark: SyncWatermark) -> Result<()> {
        self.state().watermarks.push(watermark);
        Ok(())
    }
}

impl MessageStore for FakeStore {
    async fn find_by_user_and_message_id(
        &self,
        user_id: i64,
        message_id: &str,
    ) -> Result<Option<StoredMessage>> {
        Ok(self
            .state()
            .messages
            .iter()
            .find(|m| m.record.user_id == user_id && m.record.message_id == message_id)
            .cloned())
    }

    async fn insert(&self, record: &MessageRecord) -> Result<InsertOutcome> {
        let mut state = self.state();
        if state.failing_insert.as_deref() == Some(record.message_id.as_str()) {
            bail!("disk I/O error");
        }
        if state.racing_inserts {
            return Ok(InsertOutcome::AlreadyPresent);
        }

        state.inserts += 1;
        let id = state.messages.len() as i64 + 1;
        state.messages.push(StoredMessage {
            id,
            record: record.clone(),
            created_at: Utc::now(),
        });
        Ok(InsertOutcome::Inserted(id))
    }

    async fn count_by_user(&self, user_id: i64, filter: &MessageFilter) -> Result<u64> {
        Ok(self
            .state()
            .messages
            .iter()
            .filter(|m| m.record.user_id == user_id && (!filter.unread_only || !m.record.is_read))
            .count() as u64)
    }

    async fn update_read_flag(&self, id: i64, is_read: bool) -> Result<()> {
        let mut state = self.state();
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| anyhow!("no message {}", id))?;
        message.record.is_read = is_read;
        Ok(())
    }

    async fn query_page(&self, user_id: i64, query: &MessageQuery) -> Result<Vec<StoredMessage>> {
        Ok(self
            .state()
            .messages
            .iter()
            .filter(|m| m.record.user_id == user_id)
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn get_for_user(&self, user_id: i64, id: i64) -> Result<Option<StoredMessage>> {
        Ok(self
            .state()
            .messages
            .iter()
            .find(|m| m.id == id && m.record.user_id == user_id)
            .cloned())
    }
}

//
// Token provider
//

#[derive(Clone)]
pub struct FakeTokenProvider {
    outcome: std::result::Result<TokenGrant, String>,
    calls: Arc<Mutex<usize>>,
}

impl FakeTokenProvider {
    pub fn granting(access_token: &str, expiry: DateTime<Utc>) -> Self {
        Self {
            outcome: Ok(TokenGrant {
                access_token: access_token.to_string(),
                expiry: Some(expiry),
            }),
            calls: Arc::default(),
        }
    }

    pub fn rejecting(error: &str) -> Self {
        Self {
            outcome: Err(error.to_string()),
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl TokenProvider for FakeTokenProvider {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant> {
        *self.calls.lock().unwrap() += 1;
        self.outcome
            .clone()
            .map_err(|e| anyhow!("Token refresh failed: {}", e))
    }
}

//
// Protocol session
//

#[derive(Default)]
struct SessionLog {
    identities: Vec<(String, String)>,
    selected: Vec<(String, bool)>,
    requested: Vec<(u32, u32)>,
    closes: usize,
}

/// A mailbox of numbered messages; sequence `n` carries provider id `msg-n`.
#[derive(Clone)]
pub struct FakeSession {
    messages: Vec<FetchedMessage>,
    fail_select: bool,
    fail_fetch_at: Option<u32>,
    log: Arc<Mutex<SessionLog>>,
}

impl FakeSession {
    pub fn with_messages(count: u32) -> Self {
        Self {
            messages: (1..=count).map(numbered_message).collect(),
            fail_select: false,
            fail_fetch_at: None,
            log: Arc::default(),
        }
    }

    /// Fail the FETCH of the window starting at `start`.
    pub fn failing_fetch_at(mut self, start: u32) -> Self {
        self.fail_fetch_at = Some(start);
        self
    }

    pub fn replace(&mut self, sequence: u32, message: FetchedMessage) {
        self.messages[sequence as usize - 1] = message;
    }

    pub fn requested(&self) -> Vec<(u32, u32)> {
        self.log.lock().unwrap().requested.clone()
    }
}

impl MailSession for FakeSession {
    async fn select_mailbox(&mut self, name: &str, read_only: bool) -> Result<MailboxStatus> {
        self.log
            .lock()
            .unwrap()
            .selected
            .push((name.to_string(), read_only));
        if self.fail_select {
            bail!("NO [NONEXISTENT] Unknown mailbox");
        }
        Ok(MailboxStatus {
            total_messages: self.messages.len() as u32,
        })
    }

    async fn fetch_range(&mut self, window: FetchWindow) -> Result<Vec<FetchedMessage>> {
        self.log
            .lock()
            .unwrap()
            .requested
            .push((window.start, window.end));
        if self.fail_fetch_at == Some(window.start) {
            bail!("BAD [SERVERBUG] fetch aborted");
        }
        Ok(self.messages[window.start as usize - 1..window.end as usize].to_vec())
    }

    async fn close(&mut self) {
        self.log.lock().unwrap().closes += 1;
    }
}

/// Hands out clones of one `FakeSession`, all sharing its call log.
#[derive(Clone)]
pub struct FakeOpener {
    template: FakeSession,
    refuse: Option<String>,
}

impl FakeOpener {
    pub fn with_messages(count: u32) -> Self {
        Self {
            template: FakeSession::with_messages(count),
            refuse: None,
        }
    }

    pub fn refusing(error: &str) -> Self {
        Self {
            template: FakeSession::with_messages(0),
            refuse: Some(error.to_string()),
        }
    }

    pub fn failing_select(mut self) -> Self {
        self.template.fail_select = true;
        self
    }

    pub fn failing_fetch_at(mut self, start: u32) -> Self {
        self.template.fail_fetch_at = Some(start);
        self
    }

    pub fn replace(mut self, sequence: u32, message: FetchedMessage) -> Self {
        self.template.replace(sequence, message);
        self
    }

    pub fn identities(&self) -> Vec<(String, String)> {
        self.template.log.lock().unwrap().identities.clone()
    }

    pub fn selected(&self) -> Vec<(String, bool)> {
        self.template.log.lock().unwrap().selected.clone()
    }

    pub fn requested(&self) -> Vec<(u32, u32)> {
        self.template.requested()
    }

    pub fn closes(&self) -> usize {
        self.template.log.lock().unwrap().closes
    }
}

impl SessionOpener for FakeOpener {
    type Session = FakeSession;

    async fn open(&self, identity: &str, access_token: &str) -> Result<FakeSession> {
        self.template
            .log
            .lock()
            .unwrap()
            .identities
            .push((identity.to_string(), access_token.to_string()));
        if let Some(error) = &self.refuse {
            bail!("{}", error);
        }
        Ok(self.template.clone())
    }
}
