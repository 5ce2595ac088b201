mod account;
mod cache;
mod config;
mod constants;
mod error;
mod mail;
mod mailbox;
mod oauth2;
mod sync;

use anyhow::{Context, Result, bail};
use std::env;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cache::Database;
use crate::config::Config;
use crate::mail::imap::ImapConnector;
use crate::mailbox::{ListOptions, MailboxService};
use crate::oauth2::GoogleOAuth2;
use crate::sync::SyncEngine;

fn setup_logging() {
    use std::fs::OpenOptions;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mailsync=debug"));

    // Try to create a log file in the config directory
    let log_file = Config::config_dir()
        .ok()
        .map(|dir| dir.join("mailsync.log"))
        .and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .ok()
        });

    if let Some(file) = log_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        // Fallback to stderr if file logging fails
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_usage() {
    eprintln!(
        r#"mailsync - Gmail mailbox synchronization over IMAP/XOAUTH2

Usage: mailsync <command> [args]

Commands:
    sync <user-id>                      Fetch new mail into the local store
    list <user-id> [options]            List stored messages, newest first
        --page N                        Page number (default 1)
        --limit N                       Page size (default 20, max 100)
        --search TEXT                   Match subject, sender, recipients or body
        --unread                        Only unread messages
    show <user-id> <email-id>           Print a message and mark it read
    read <user-id> <email-id>           Mark a message read
    stats <user-id>                     Message counts
    authorize <code> <redirect-uri>     Store tokens for an authorized account
    logout <user-id>                    Revoke stored tokens
    help                                Show this help message

Configuration file: ~/.config/mailsync/config.toml
"#
    );
}

fn parse_id(value: Option<&String>, what: &str) -> Result<i64> {
    let value = value.with_context(|| format!("Missing {}", what))?;
    value
        .parse()
        .with_context(|| format!("Invalid {}: '{}'", what, value))
}

fn parse_list_options(args: &[String]) -> Result<ListOptions> {
    let mut options = ListOptions::default();
    let mut args = args.iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--page" => {
                let value = args.next().context("--page needs a value")?;
                options.page = Some(value.parse().context("--page must be a number")?);
            }
            "--limit" => {
                let value = args.next().context("--limit needs a value")?;
                options.limit = Some(value.parse().context("--limit must be a number")?);
            }
            "--search" => {
                options.search = Some(args.next().context("--search needs a value")?.clone());
            }
            "--unread" => options.unread_only = true,
            other => bail!("Unknown option for list: {}", other),
        }
    }

    Ok(options)
}

async fn open_database(config: &Config) -> Result<Database> {
    config.ensure_dirs()?;
    let path = config.database_path()?;
    Database::open(&path)
        .await
        .with_context(|| format!("Failed to open database at {}", path.display()))
}

async fn run(command: &str, args: &[String]) -> Result<()> {
    let config = Config::load()?;
    let db = open_database(&config).await?;

    match command {
        "sync" => {
            let user_id = parse_id(args.first(), "user id")?;
            if let Some(mark) = db.get_watermark(user_id).await? {
                tracing::info!(
                    "Last successful sync for user {} was {}s ago",
                    user_id,
                    mark.age_secs(chrono::Utc::now())
                );
            }
            let engine = SyncEngine::from_config(
                db.clone(),
                GoogleOAuth2::new(config.oauth.clone())?,
                ImapConnector::new(config.imap.clone())?,
                &config,
            );
            let summary = engine.sync(user_id).await?;
            println!("Synced {} new of {} messages", summary.synced, summary.total);
        }
        "list" => {
            let user_id = parse_id(args.first(), "user id")?;
            let options = parse_list_options(args.get(1..).unwrap_or_default())?;
            let page = MailboxService::new(db).list(user_id, &options).await?;

            for email in &page.emails {
                println!(
                    "{:>6} {} {} {:<30} {}",
                    email.id,
                    if email.record.is_read { " " } else { "*" },
                    email.record.date.format("%Y-%m-%d %H:%M"),
                    email.record.from,
                    email.record.subject
                );
            }
            println!(
                "Page {} ({} per page), {} matching messages",
                page.page, page.limit, page.total
            );
        }
        "show" => {
            let user_id = parse_id(args.first(), "user id")?;
            let email_id = parse_id(args.get(1), "email id")?;
            let email = MailboxService::new(db).get(user_id, email_id).await?;
            println!("{}", serde_json::to_string_pretty(&email)?);
        }
        "read" => {
            let user_id = parse_id(args.first(), "user id")?;
            let email_id = parse_id(args.get(1), "email id")?;
            MailboxService::new(db).mark_as_read(user_id, email_id).await?;
            println!("Marked {} as read", email_id);
        }
        "stats" => {
            let user_id = parse_id(args.first(), "user id")?;
            let stats = MailboxService::new(db).stats(user_id).await?;
            println!(
                "{} messages: {} unread, {} read",
                stats.total, stats.unread, stats.read
            );
        }
        "authorize" => {
            let code = args.first().context("Missing authorization code")?;
            let redirect_uri = args.get(1).context("Missing redirect URI")?;
            let oauth = GoogleOAuth2::new(config.oauth.clone())?;
            let authorized = account::authorize(&oauth, &db, code, redirect_uri).await?;
            println!(
                "{} {} as user {}",
                if authorized.created { "Registered" } else { "Re-authorized" },
                authorized.email,
                authorized.user_id
            );
        }
        "logout" => {
            let user_id = parse_id(args.first(), "user id")?;
            account::logout(&db, user_id).await?;
            println!("Logged out user {}", user_id);
        }
        other => bail!("Unknown command: {}", other),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("help") | Some("--help") | Some("-h") | None => {
            print_usage();
            Ok(())
        }
        Some(cmd @ ("sync" | "list" | "show" | "read" | "stats" | "authorize" | "logout")) => {
            setup_logging();
            run(cmd, &args[2..]).await
        }
        Some(cmd) => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            std::process::exit(1);
        }
    }
}
