//! xsync - incremental X timeline mirroring
//!
//! Fetches a user's posts page by page, newest first, and stores each post
//! not already present in a local `SQLite` table.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`config`] - Layered configuration and API credentials
//! - [`error`] - Error types
//! - [`fetch`] - Signed timeline page requests
//! - [`model`] - Records, cursors and run summaries
//! - [`normalize`] - Raw API item to record mapping
//! - [`oauth`] - OAuth 1.0a request signing
//! - [`storage`] - `SQLite` storage layer
//! - [`sync`] - The pagination and deduplication loop

pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod oauth;
pub mod storage;
pub mod sync;

pub use cli::*;
pub use config::{Config, Credentials};
pub use error::{Result, SyncError, format_error, format_sync_error};
pub use fetch::{Fetcher, TimelineClient};
pub use model::*;
pub use normalize::normalize;
pub use storage::Storage;
pub use sync::{SyncObserver, SyncOptions, Syncer, should_stop};

/// Standard width for dividers in CLI output
pub const CONTENT_DIVIDER_WIDTH: usize = 40;

/// Get the default data directory for xsync
#[must_use]
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("xsync")
}

/// Format an integer with thousands separators.
#[must_use]
pub fn format_number(value: i64) -> String {
    let abs = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(abs.len() + abs.len() / 3);

    for (idx, ch) in abs.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    let mut formatted: String = out.chars().rev().collect();
    if value < 0 {
        formatted.insert(0, '-');
    }
    formatted
}

/// Format an unsigned count with thousands separators.
#[must_use]
pub fn format_count(value: u64) -> String {
    format_number(i64::try_from(value).unwrap_or(i64::MAX))
}

/// Shorten text to `max_chars`, appending an ellipsis when cut.
#[must_use]
pub fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let kept: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::{format_count, format_number, truncate};

    #[test]
    fn format_number_adds_separators() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(12_345_678), "12,345,678");
        assert_eq!(format_number(-12_345), "-12,345");
        assert_eq!(format_count(3_200), "3,200");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 40), "line one line two");
        assert_eq!(truncate("🦀🦀🦀🦀🦀🦀", 5), "🦀🦀...");
    }
}
