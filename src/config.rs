//! Configuration system for xsync.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/xsync/config.toml`
//! 3. **Environment variables** - `XSYNC_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! API credentials are handled separately by [`Credentials`]: they are only
//! ever read from the environment, once, at startup.
//!
//! # Example Configuration File
//!
//! ```toml
//! [paths]
//! data_dir = "~/.local/share/xsync"
//!
//! [api]
//! base_url = "https://api.twitter.com/1.1"
//! page_size = 200
//! sleep_ms = 1000
//!
//! [output]
//! colors = true
//! ```

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default timeline API base.
pub const DEFAULT_API_BASE: &str = "https://api.twitter.com/1.1";

/// Largest page the timeline endpoint serves.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Default delay between page requests.
pub const DEFAULT_SLEEP_MS: u64 = 1000;

/// Environment variables holding the four signing credentials.
pub const CREDENTIAL_VARS: [&str; 4] = [
    "CONSUMER_KEY",
    "CONSUMER_SECRET",
    "ACCESS_TOKEN",
    "ACCESS_SECRET",
];

/// Main configuration structure for xsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path-related configuration.
    pub paths: PathsConfig,
    /// Timeline API configuration.
    pub api: ApiConfig,
    /// Output formatting configuration.
    pub output: OutputConfig,
}

/// Path configuration for database locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Explicit database file. When unset each target gets
    /// `<data_dir>/<handle>_retrieved.db`.
    /// Environment variable: `XSYNC_DB`
    pub db: Option<PathBuf>,

    /// Directory for per-target database files.
    /// Environment variable: `XSYNC_DATA_DIR`
    pub data_dir: Option<PathBuf>,
}

/// Timeline API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the v1.1 API.
    /// Environment variable: `XSYNC_API_BASE`
    pub base_url: String,

    /// Items requested per page (1-200).
    /// Environment variable: `XSYNC_PAGE_SIZE`
    pub page_size: u32,

    /// Delay between page requests in milliseconds.
    /// Environment variable: `XSYNC_SLEEP_MS`
    pub sleep_ms: u64,

    /// Request timeout in seconds; unset leaves the transport default.
    pub timeout_secs: Option<u64>,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Enable colored output.
    pub colors: bool,

    /// Suppress per-item output and progress.
    pub quiet: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            page_size: MAX_PAGE_SIZE,
            sleep_ms: DEFAULT_SLEEP_MS,
            timeout_secs: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            colors: true,
            quiet: false,
        }
    }
}

impl ApiConfig {
    /// Delay between page requests.
    #[must_use]
    pub const fn sleep(&self) -> Duration {
        Duration::from_millis(self.sleep_ms)
    }

    /// Check the page size is one the endpoint accepts.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidArgument`] for 0 or more than 200.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(SyncError::invalid_argument(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.base_url.trim().is_empty() {
            return Err(SyncError::invalid_argument("API base URL is empty"));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. User config file (~/.config/xsync/config.toml)
    /// 3. Compiled defaults
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConfigError`] if the user config file exists but
    /// cannot be parsed.
    pub fn load() -> Result<Self> {
        let mut config = match Self::user_config_path() {
            Some(path) if path.exists() => Self::load_from_file(&path)?,
            _ => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());

        debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConfigError`] if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SyncError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let config = toml::from_str(&content).map_err(|e| SyncError::ConfigError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("xsync").join("config.toml"))
    }

    /// Apply environment variable overrides through `lookup`.
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("XSYNC_DB") {
            self.paths.db = Some(PathBuf::from(db));
        }
        if let Some(dir) = lookup("XSYNC_DATA_DIR") {
            self.paths.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(base) = lookup("XSYNC_API_BASE") {
            self.api.base_url = base;
        }
        if let Some(n) = lookup("XSYNC_PAGE_SIZE").and_then(|v| v.parse().ok()) {
            self.api.page_size = n;
        }
        if let Some(n) = lookup("XSYNC_SLEEP_MS").and_then(|v| v.parse().ok()) {
            self.api.sleep_ms = n;
        }

        if lookup("XSYNC_NO_COLOR").is_some() || lookup("NO_COLOR").is_some() {
            self.output.colors = false;
        }
        if lookup("XSYNC_QUIET").is_some() {
            self.output.quiet = true;
        }
    }

    /// Directory holding per-target database files.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(crate::default_data_dir)
    }

    /// Database file for a target, honouring an explicit `db` path.
    #[must_use]
    pub fn db_path_for(&self, screen_name: &str) -> PathBuf {
        self.paths.db.clone().unwrap_or_else(|| {
            crate::storage::default_db_file(&self.data_dir(), screen_name)
        })
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// The four OAuth 1.0a secrets, read once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("access_token", &self.access_token)
            .field("access_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MissingCredentials`] naming every absent variable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary lookup. Empty values count as
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MissingCredentials`] naming every absent variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values = Vec::with_capacity(CREDENTIAL_VARS.len());
        let mut missing = Vec::new();
        for var in CREDENTIAL_VARS {
            match lookup(var).filter(|v| !v.trim().is_empty()) {
                Some(value) => values.push(value),
                None => missing.push(var),
            }
        }

        if !missing.is_empty() {
            return Err(SyncError::MissingCredentials { vars: missing });
        }

        let [consumer_key, consumer_secret, access_token, access_secret]: [String; 4] = values
            .try_into()
            .map_err(|_| SyncError::MissingCredentials {
                vars: CREDENTIAL_VARS.to_vec(),
            })?;

        Ok(Self {
            consumer_key,
            consumer_secret,
            access_token,
            access_secret,
        })
    }
}
