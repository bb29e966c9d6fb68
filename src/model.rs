//! Data models for timeline sync.
//!
//! `RawItem` is whatever the timeline endpoint returned for one post;
//! `Record` is the normalized row the storage layer persists.

use serde::{Deserialize, Serialize};

/// One untouched item from a timeline page.
pub type RawItem = serde_json::Value;

/// A normalized post, ready to insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub external_id: String,
    pub created_at: String,
    pub text: String,
    pub source: String,
    pub retweet_count: i64,
    pub favorite_count: i64,
    pub geo: String,
    pub coordinates: String,
    pub place: String,
    pub reply_to_id: Option<String>,
    pub permalink: String,
}

/// A record as read back from the database, with its surrogate key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub local_id: i64,
    #[serde(flatten)]
    pub record: Record,
}

/// Upper-bound post identifier used to request older posts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `max_id` value that asks for posts strictly older than this cursor.
    ///
    /// The upstream `max_id` bound is inclusive, so numeric ids are stepped
    /// down by one. Anything unparseable is passed through untouched.
    #[must_use]
    pub fn exclusive_max_id(&self) -> String {
        match self.0.parse::<u64>() {
            Ok(id) if id > 0 => (id - 1).to_string(),
            _ => self.0.clone(),
        }
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a completed sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Records inserted during this run.
    pub new_count: u64,
    /// Items that were already stored.
    pub known_count: u64,
    /// Number of pages requested, including the final one.
    pub pages: u64,
}

/// Statistics about one target's stored timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineStats {
    pub screen_name: String,
    pub table: String,
    pub records: i64,
    pub newest_id: Option<String>,
    pub oldest_id: Option<String>,
}
