//! Custom error types for xsync.
//!
//! Every failure a sync run can hit maps onto one variant here, so the CLI
//! can print a specific message and suggestion before exiting non-zero.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for xsync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// One or more signing credentials are absent from the environment.
    #[error("Missing required credentials: {}", vars.join(", "))]
    MissingCredentials { vars: Vec<&'static str> },

    /// Invalid command-line argument or setting value.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// The database could not be opened or its table could not be prepared.
    #[error("Failed to initialize storage at '{path}': {reason}")]
    StorageInit { path: PathBuf, reason: String },

    /// A record could not be written.
    #[error("Failed to write record: {reason}")]
    StorageWrite { reason: String },

    /// A read query failed.
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    // =========================================================================
    // Upstream Errors
    // =========================================================================
    /// Request could not be signed, or the API rejected the credentials.
    #[error("Authentication failed: {reason}")]
    Auth { reason: String },

    /// Transport failure or unexpected HTTP status.
    #[error("Network error: {reason}")]
    Network { reason: String },

    /// The API signalled throttling.
    #[error("Rate limited by the API{}", reset_hint(*retry_after))]
    RateLimit { retry_after: Option<u64> },

    /// Response body was not the expected JSON array.
    #[error("Malformed API response: {reason}")]
    MalformedResponse { reason: String },

    /// A single timeline item lacked a mandatory field.
    #[error("Malformed timeline item: {reason}")]
    MalformedItem { reason: String },

    // =========================================================================
    // IO Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

const CREDENTIALS_HINT: &str =
    "Export CONSUMER_KEY, CONSUMER_SECRET, ACCESS_TOKEN and ACCESS_SECRET from your X app.";
const AUTH_HINT: &str =
    "Check that the credentials belong to the same app and have not been revoked.";
const RATE_LIMIT_HINT: &str =
    "Wait for the rate-limit window to reset, then rerun. Stored posts are skipped.";
const NETWORK_HINT: &str = "Rerun once the connection is back; progress so far is kept.";
const STORAGE_HINT: &str =
    "Check that the database directory is writable, or point --db at another file.";
const PAYLOAD_HINT: &str = "Rerun with --verbose to see the offending payload.";

fn reset_hint(retry_after: Option<u64>) -> String {
    retry_after.map_or_else(String::new, |s| format!(" (resets in {s}s)"))
}

/// Result type alias for xsync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a storage initialization error.
    pub fn storage_init(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::StorageInit {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a storage write error.
    pub fn storage_write(reason: impl ToString) -> Self {
        Self::StorageWrite {
            reason: reason.to_string(),
        }
    }

    /// Create an authentication error.
    pub fn auth(reason: impl Into<String>) -> Self {
        Self::Auth {
            reason: reason.into(),
        }
    }

    /// Create a network error.
    pub fn network(reason: impl ToString) -> Self {
        Self::Network {
            reason: reason.to_string(),
        }
    }

    /// Create a malformed response error.
    pub fn malformed_response(reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
        }
    }

    /// Create a malformed item error.
    pub fn malformed_item(reason: impl Into<String>) -> Self {
        Self::MalformedItem {
            reason: reason.into(),
        }
    }

    /// True for errors raised before any network or storage activity.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials { .. }
                | Self::InvalidArgument { .. }
                | Self::ConfigError { .. }
        )
    }

    /// True for failures reported by (or on the way to) the timeline API.
    #[must_use]
    pub const fn is_upstream_error(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. }
                | Self::Network { .. }
                | Self::RateLimit { .. }
                | Self::MalformedResponse { .. }
        )
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::MissingCredentials { .. } => Some(CREDENTIALS_HINT),
            Self::Auth { .. } => Some(AUTH_HINT),
            Self::RateLimit { .. } => Some(RATE_LIMIT_HINT),
            Self::Network { .. } => Some(NETWORK_HINT),
            Self::StorageInit { .. } => Some(STORAGE_HINT),
            Self::MalformedItem { .. } | Self::MalformedResponse { .. } => Some(PAYLOAD_HINT),
            _ => None,
        }
    }
}

// =============================================================================
// CLI Error Formatting Utilities
// =============================================================================

use colored::Colorize;

/// Format a structured CLI error with explanation and suggestions.
///
/// # Arguments
/// * `title` - Brief error title (e.g., "Sync failed")
/// * `explanation` - What went wrong and why
/// * `suggestions` - List of actionable suggestions
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    if !suggestions.is_empty() {
        output.push_str("\n\n   ");
        if suggestions.len() == 1 {
            let _ = write!(output, "{} {}", "Hint:".cyan(), suggestions[0]);
        } else {
            let _ = write!(output, "{}:", "Try".cyan());
            for suggestion in suggestions {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}

/// Render a [`SyncError`] for the terminal, attaching its suggestion.
#[must_use]
pub fn format_sync_error(title: &str, err: &SyncError) -> String {
    let explanation = err.to_string();
    let suggestions: Vec<&str> = err.suggestion().into_iter().collect();
    format_error(title, &explanation, &suggestions)
}
