//! Application-wide constants for tuning and configuration
//!
//! Centralizes magic numbers to make them discoverable and configurable.

/// Number of messages requested per FETCH window.
/// Bounds peak memory and keeps one protocol request in flight.
pub const DEFAULT_WINDOW_SIZE: u32 = 50;

/// Mailbox selected for synchronization.
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// Default IMAP endpoint (Gmail over implicit TLS).
pub const DEFAULT_IMAP_HOST: &str = "imap.gmail.com";
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// TCP + TLS connection timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// XOAUTH2 authentication timeout in seconds.
pub const AUTH_TIMEOUT_SECS: u64 = 30;

/// Timeout for calls to the OAuth2 token and userinfo endpoints.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Characters of plain-text body kept as the message snippet.
pub const SNIPPET_LENGTH: usize = 200;

/// Subject stored for messages without one.
pub const NO_SUBJECT: &str = "(No Subject)";

/// Page size used when listing stored messages without an explicit limit.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound on the page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;
