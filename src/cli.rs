//! CLI definitions for xsync.
//!
//! Uses clap for argument parsing with derive macros.

use crate::error::{Result, SyncError};
use crate::logging::LogLevel;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// xsync - mirror an X timeline into SQLite
#[derive(Parser, Debug)]
#[command(name = "xsync")]
#[command(version)]
#[command(about = "Incrementally mirror an X user timeline into a local SQLite database")]
#[command(long_about = r#"
xsync walks a user's timeline from the newest post backwards and stores every
post it has not seen before. Rerunning it later only adds what is new.

Credentials are read from CONSUMER_KEY, CONSUMER_SECRET, ACCESS_TOKEN and
ACCESS_SECRET.

Quick start:
  1. Export the four credentials of your X developer app
  2. Run: xsync sync --screen-name jack
  3. Inspect: xsync stats --screen-name jack
"#)]
pub struct Cli {
    /// Path to the database file (default: <data dir>/<handle>_retrieved.db)
    #[arg(long, env = "XSYNC_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Be verbose (show debug info)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Be quiet (suppress per-post output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Log level (error, warn, info, debug, trace, off); overrides -v and -q
    #[arg(long, env = "XSYNC_LOG_LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch new posts for an account and store them
    Sync(SyncArgs),

    /// Show what is stored for an account
    Stats(StatsArgs),

    /// Show the effective configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Screen name of the account to retrieve
    #[arg(long = "screen-name", alias = "screen_name", short = 's')]
    pub screen_name: String,

    /// Posts requested per page (1-200)
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Pause between page requests, in milliseconds
    #[arg(long)]
    pub sleep_ms: Option<u64>,

    /// Base URL of the v1.1 API
    #[arg(long, env = "XSYNC_API_BASE")]
    pub api_base: Option<String>,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Screen name of the account to inspect
    #[arg(long = "screen-name", alias = "screen_name", short = 's')]
    pub screen_name: String,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Print a default config file instead of the effective settings
    #[arg(long, conflicts_with = "path")]
    pub default: bool,

    /// Print where the config file is looked up
    #[arg(long)]
    pub path: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
}

/// Normalize a screen name the way the store keys it.
#[must_use]
pub fn normalize_screen_name(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_lowercase()
}

/// Normalize a screen name and check it is a plausible handle.
///
/// Handles are limited to ASCII letters, digits and `_`.
///
/// # Errors
///
/// Returns [`SyncError::InvalidArgument`] for an empty handle or one with
/// any other character.
pub fn validate_screen_name(raw: &str) -> Result<String> {
    let screen_name = normalize_screen_name(raw);
    if screen_name.is_empty() {
        return Err(SyncError::invalid_argument("screen name must not be empty"));
    }
    if let Some(bad) = screen_name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
    {
        return Err(SyncError::invalid_argument(format!(
            "screen name '{screen_name}' contains '{bad}'; only letters, digits and _ are allowed"
        )));
    }
    Ok(screen_name)
}
