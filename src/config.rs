use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::constants::{
    AUTH_TIMEOUT_SECS, CONNECT_TIMEOUT_SECS, DEFAULT_IMAP_HOST, DEFAULT_IMAP_PORT,
    DEFAULT_MAILBOX, DEFAULT_WINDOW_SIZE,
};
use crate::sync::WindowCoverage;

const ENV_CLIENT_ID: &str = "MAILSYNC_OAUTH_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "MAILSYNC_OAUTH_CLIENT_SECRET";
const ENV_IMAP_HOST: &str = "MAILSYNC_IMAP_HOST";
const ENV_IMAP_PORT: &str = "MAILSYNC_IMAP_PORT";

// Google OAuth2 endpoints
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub imap: ImapConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImapConfig {
    #[serde(default = "default_imap_server")]
    pub server: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    /// Mailbox walked by a sync
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    /// Request X-GM-MSGID and X-GM-LABELS in fetches
    #[serde(default = "default_true")]
    pub gmail_extensions: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            server: default_imap_server(),
            port: default_imap_port(),
            mailbox: default_mailbox(),
            gmail_extensions: true,
            connect_timeout_secs: default_connect_timeout_secs(),
            auth_timeout_secs: default_auth_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Messages per FETCH window
    #[serde(default = "default_window_size")]
    pub window_size: u32,
    /// `latest` walks only the newest window; `full` walks the whole mailbox
    #[serde(default)]
    pub coverage: WindowCoverage,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            coverage: WindowCoverage::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_userinfo_url")]
    pub userinfo_url: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            token_url: default_token_url(),
            userinfo_url: default_userinfo_url(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to `<data dir>/mailsync.db`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_imap_server() -> String {
    DEFAULT_IMAP_HOST.to_string()
}

fn default_imap_port() -> u16 {
    DEFAULT_IMAP_PORT
}

fn default_mailbox() -> String {
    DEFAULT_MAILBOX.to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    CONNECT_TIMEOUT_SECS
}

fn default_auth_timeout_secs() -> u64 {
    AUTH_TIMEOUT_SECS
}

fn default_window_size() -> u32 {
    DEFAULT_WINDOW_SIZE
}

fn default_token_url() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

fn default_userinfo_url() -> String {
    GOOGLE_USERINFO_URL.to_string()
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("mailsync");
        Ok(dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let dir = dirs::data_local_dir()
            .context("Could not find data directory")?
            .join("mailsync");
        Ok(dir)
    }

    /// Load the config file if present, then apply environment overrides.
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(client_id) = var(ENV_CLIENT_ID) {
            self.oauth.client_id = client_id;
        }
        if let Some(secret) = var(ENV_CLIENT_SECRET) {
            self.oauth.client_secret = Some(secret);
        }
        if let Some(host) = var(ENV_IMAP_HOST) {
            self.imap.server = host;
        }
        if let Some(port) = var(ENV_IMAP_PORT) {
            self.imap.port = port
                .parse()
                .with_context(|| format!("{} must be a port number, got '{}'", ENV_IMAP_PORT, port))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.window_size == 0 {
            anyhow::bail!("sync.window_size must be at least 1");
        }
        if self.imap.mailbox.is_empty() {
            anyhow::bail!("imap.mailbox must not be empty");
        }
        Ok(())
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("mailsync.db")),
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(Self::config_dir()?)?;
        if let Some(parent) = self.database_path()?.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.imap.server, "imap.gmail.com");
        assert_eq!(config.imap.port, 993);
        assert_eq!(config.imap.mailbox, "INBOX");
        assert!(config.imap.gmail_extensions);
        assert_eq!(config.imap.connect_timeout_secs, 30);
        assert_eq!(config.sync.window_size, 50);
        assert_eq!(config.sync.coverage, WindowCoverage::Latest);
        assert_eq!(config.oauth.token_url, GOOGLE_TOKEN_URL);
        assert!(config.database.path.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [imap]
            server = "imap.example.com"
            port = 1993
            gmail_extensions = false

            [sync]
            window_size = 25
            coverage = "full"

            [oauth]
            client_id = "client.apps.example.com"
            client_secret = "shh"

            [database]
            path = "/var/lib/mailsync/mail.db"
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.imap.server, "imap.example.com");
        assert_eq!(config.imap.port, 1993);
        assert!(!config.imap.gmail_extensions);
        assert_eq!(config.sync.window_size, 25);
        assert_eq!(config.sync.coverage, WindowCoverage::Full);
        assert_eq!(config.oauth.client_id, "client.apps.example.com");
        assert_eq!(config.oauth.client_secret.as_deref(), Some("shh"));
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/var/lib/mailsync/mail.db")
        );
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_CLIENT_ID, "env-client"),
            (ENV_IMAP_HOST, "imap.env.test"),
            (ENV_IMAP_PORT, "143"),
        ]);

        let mut config = Config::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.oauth.client_id, "env-client");
        assert_eq!(config.imap.server, "imap.env.test");
        assert_eq!(config.imap.port, 143);
        assert!(config.oauth.client_secret.is_none());
    }

    #[test]
    fn test_invalid_env_port_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == ENV_IMAP_PORT).then(|| "imap".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_window_size_is_invalid() {
        let config = Config::from_toml("[sync]\nwindow_size = 0").unwrap();
        assert!(config.validate().is_err());
    }
}
