//! `SQLite` storage for synced timelines.
//!
//! Each target account gets its own table, so one database file can hold
//! several timelines. Deduplication is left to the caller: `insert` never
//! checks for an existing row with the same external id.

use crate::error::{Result, SyncError};
use crate::model::{Record, StoredRecord, TimelineStats};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Columns every timeline table must carry. An existing table missing any
/// of these is rejected at open time.
const REQUIRED_COLUMNS: &[&str] = &[
    "id",
    "created_at",
    "full_text",
    "tweet_id",
    "source",
    "retweets",
    "favorites",
    "geo",
    "coordinates",
    "place",
    "reply_to",
    "deeplink",
];

const SELECT_COLUMNS: &str = "id, tweet_id, created_at, full_text, source, retweets, favorites, \
                              geo, coordinates, place, reply_to, deeplink";

/// Reduce a handle to the form used in table and file names.
///
/// Lowercased; anything outside `[a-z0-9_]` becomes `_`.
#[must_use]
pub fn sanitize_handle(screen_name: &str) -> String {
    screen_name
        .trim()
        .trim_start_matches('@')
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Build the table name for a target account handle.
#[must_use]
pub fn table_name_for(screen_name: &str) -> String {
    format!("tweets_{}", sanitize_handle(screen_name))
}

/// `SQLite` storage manager for one target's timeline table.
pub struct Storage {
    conn: Connection,
    table: String,
}

impl Storage {
    /// Open or create the database at the given path and prepare the
    /// target's table.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::StorageInit`] if the file cannot be opened or the
    /// existing table is incompatible.
    pub fn open(db_path: impl AsRef<Path>, screen_name: &str) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path).map_err(|e| SyncError::storage_init(path, e))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )
        .map_err(|e| SyncError::storage_init(path, e))?;

        let storage = Self {
            conn,
            table: table_name_for(screen_name),
        };
        storage.ensure_table(path)?;
        Ok(storage)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory(screen_name: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SyncError::storage_init(":memory:", e))?;
        let storage = Self {
            conn,
            table: table_name_for(screen_name),
        };
        storage.ensure_table(Path::new(":memory:"))?;
        Ok(storage)
    }

    /// Name of the table this handle reads and writes.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn ensure_table(&self, path: &Path) -> Result<()> {
        let existing = self
            .existing_columns()
            .map_err(|e| SyncError::storage_init(path, e))?;

        if existing.is_empty() {
            info!(table = %self.table, "Creating timeline table");
        } else {
            let missing: Vec<&str> = REQUIRED_COLUMNS
                .iter()
                .copied()
                .filter(|col| !existing.iter().any(|c| c == col))
                .collect();
            if !missing.is_empty() {
                return Err(SyncError::storage_init(
                    path,
                    format!(
                        "table {} exists but lacks columns: {}",
                        self.table,
                        missing.join(", ")
                    ),
                ));
            }
            debug!(table = %self.table, "Reusing existing timeline table");
        }

        let table = &self.table;
        self.conn
            .execute_batch(&format!(
                r"
                CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY,
                    created_at TEXT,
                    full_text TEXT,
                    tweet_id TEXT NOT NULL,
                    source TEXT,
                    retweets INTEGER,
                    favorites INTEGER,
                    geo TEXT,
                    coordinates TEXT,
                    place TEXT,
                    reply_to TEXT,
                    deeplink TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_tweet_id ON {table}(tweet_id);
                "
            ))
            .map_err(|e| SyncError::storage_init(path, e))?;

        Ok(())
    }

    fn existing_columns(&self) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", self.table))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    /// True if at least one record with this external id is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn exists(&self, external_id: &str) -> Result<bool> {
        let found = self
            .conn
            .prepare_cached(&format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE tweet_id = ?)",
                self.table
            ))?
            .query_row(params![external_id], |row| row.get::<_, bool>(0))?;
        Ok(found)
    }

    /// Append a record and return its surrogate key.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::StorageWrite`] if the insert fails.
    pub fn insert(&self, record: &Record) -> Result<i64> {
        let sql = format!(
            "INSERT INTO {} (created_at, full_text, tweet_id, source, retweets, favorites, \
             geo, coordinates, place, reply_to, deeplink) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            self.table
        );
        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .map_err(SyncError::storage_write)?;
        stmt.execute(params![
            record.created_at,
            record.text,
            record.external_id,
            record.source,
            record.retweet_count,
            record.favorite_count,
            record.geo,
            record.coordinates,
            record.place,
            record.reply_to_id,
            record.permalink,
        ])
        .map_err(SyncError::storage_write)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Total number of stored records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn count(&self) -> Result<i64> {
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Number of stored records sharing one external id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn count_external_id(&self, external_id: &str) -> Result<i64> {
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE tweet_id = ?", self.table),
            params![external_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Get the first stored record with this external id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get(&self, external_id: &str) -> Result<Option<StoredRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SELECT_COLUMNS} FROM {} WHERE tweet_id = ? ORDER BY id LIMIT 1",
                    self.table
                ),
                params![external_id],
                row_to_stored_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Newest stored external id (largest numeric value).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn newest_external_id(&self) -> Result<Option<String>> {
        self.boundary_id("DESC")
    }

    /// Oldest stored external id (smallest numeric value).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn oldest_external_id(&self) -> Result<Option<String>> {
        self.boundary_id("ASC")
    }

    fn boundary_id(&self, order: &str) -> Result<Option<String>> {
        // Ids are numeric strings of varying width; order by length first.
        let sql = format!(
            "SELECT tweet_id FROM {} ORDER BY length(tweet_id) {order}, tweet_id {order} LIMIT 1",
            self.table
        );
        let id = self.conn.query_row(&sql, [], |row| row.get(0)).optional()?;
        Ok(id)
    }

    /// Summary statistics for the `stats` command.
    ///
    /// # Errors
    ///
    /// Returns an error if any database query fails.
    pub fn stats(&self, screen_name: &str) -> Result<TimelineStats> {
        Ok(TimelineStats {
            screen_name: screen_name.to_string(),
            table: self.table.clone(),
            records: self.count()?,
            newest_id: self.newest_external_id()?,
            oldest_id: self.oldest_external_id()?,
        })
    }
}

/// Resolve where the database for a target lives when `--db` is not given.
///
/// Always a direct child of `data_dir`.
#[must_use]
pub fn default_db_file(data_dir: &Path, screen_name: &str) -> PathBuf {
    data_dir.join(format!("{}_retrieved.db", sanitize_handle(screen_name)))
}

fn row_to_stored_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        local_id: row.get(0)?,
        record: Record {
            external_id: row.get(1)?,
            created_at: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            text: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            source: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            retweet_count: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
            favorite_count: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
            geo: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            coordinates: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            place: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
            reply_to_id: row.get(10)?,
            permalink: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_record(id: &str, text: &str) -> Record {
        Record {
            external_id: id.to_string(),
            created_at: "Wed Jan 08 12:00:00 +0000 2025".to_string(),
            text: text.to_string(),
            source: "web".to_string(),
            retweet_count: 3,
            favorite_count: 5,
            geo: "None".to_string(),
            coordinates: "None".to_string(),
            place: "None".to_string(),
            reply_to_id: Some("1".to_string()),
            permalink: format!("https://twitter.com/jack/status/{id}"),
        }
    }

    #[test]
    fn test_table_name_for() {
        assert_eq!(table_name_for("Jack"), "tweets_jack");
        assert_eq!(table_name_for("@dev_null"), "tweets_dev_null");
        assert_eq!(table_name_for("a-b c"), "tweets_a_b_c");
    }

    #[test]
    fn test_default_db_file() {
        let path = default_db_file(Path::new("/data"), "@Jack");
        assert_eq!(path, PathBuf::from("/data/jack_retrieved.db"));
    }

    #[test]
    fn test_default_db_file_stays_in_data_dir() {
        let data_dir = Path::new("/data/xsync");
        for handle in ["../../tmp/evil", "a/b", "..", "/etc/passwd"] {
            let path = default_db_file(data_dir, handle);
            assert_eq!(path.parent(), Some(data_dir), "handle {handle:?}");
        }
        assert_eq!(
            default_db_file(data_dir, "../../tmp/evil"),
            PathBuf::from("/data/xsync/______tmp_evil_retrieved.db")
        );
        assert_eq!(table_name_for("../../tmp/evil"), "tweets_______tmp_evil");
    }

    #[test]
    fn test_create_database() {
        let storage = Storage::open_memory("jack").unwrap();
        assert_eq!(storage.table(), "tweets_jack");
        assert_eq!(storage.count().unwrap(), 0);
        assert!(!storage.exists("1").unwrap());
    }

    #[test]
    fn test_insert_and_exists() {
        let storage = Storage::open_memory("jack").unwrap();
        let first = storage.insert(&create_test_record("20", "first")).unwrap();
        let second = storage.insert(&create_test_record("19", "second")).unwrap();

        assert!(second > first);
        assert!(storage.exists("20").unwrap());
        assert!(storage.exists("19").unwrap());
        assert!(!storage.exists("18").unwrap());
        assert_eq!(storage.count().unwrap(), 2);
    }

    #[test]
    fn test_insert_does_not_deduplicate() {
        let storage = Storage::open_memory("jack").unwrap();
        storage.insert(&create_test_record("5", "a")).unwrap();
        storage.insert(&create_test_record("5", "a")).unwrap();
        assert_eq!(storage.count_external_id("5").unwrap(), 2);
    }

    #[test]
    fn test_get_round_trips_fields() {
        let storage = Storage::open_memory("jack").unwrap();
        let record = create_test_record("31", "round trip");
        let local_id = storage.insert(&record).unwrap();

        let stored = storage.get("31").unwrap().unwrap();
        assert_eq!(stored.local_id, local_id);
        assert_eq!(stored.record, record);
        assert!(storage.get("32").unwrap().is_none());
    }

    #[test]
    fn test_boundary_ids_compare_numerically() {
        let storage = Storage::open_memory("jack").unwrap();
        for id in ["9", "100", "25"] {
            storage.insert(&create_test_record(id, "x")).unwrap();
        }
        let newest = storage.newest_external_id().unwrap();
        let oldest = storage.oldest_external_id().unwrap();
        assert_eq!(newest.as_deref(), Some("100"));
        assert_eq!(oldest.as_deref(), Some("9"));

        let stats = storage.stats("jack").unwrap();
        assert_eq!(stats.records, 3);
        assert_eq!(stats.table, "tweets_jack");
    }

    #[test]
    fn test_tables_are_per_target() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("shared.db");

        let jack = Storage::open(&path, "jack").unwrap();
        jack.insert(&create_test_record("1", "jack's")).unwrap();

        let ev = Storage::open(&path, "ev").unwrap();
        assert!(!ev.exists("1").unwrap());
        assert!(jack.exists("1").unwrap());
    }

    #[test]
    fn test_reopen_keeps_existing_rows() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("jack_retrieved.db");

        {
            let storage = Storage::open(&path, "jack").unwrap();
            let record = create_test_record("7", "persisted");
            storage.insert(&record).unwrap();
        }

        let storage = Storage::open(&path, "jack").unwrap();
        assert!(storage.exists("7").unwrap());
        assert_eq!(storage.count().unwrap(), 1);
    }

    #[test]
    fn test_incompatible_table_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("clash.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE tweets_jack (id INTEGER PRIMARY KEY, body TEXT);")
                .unwrap();
        }

        let err = Storage::open(&path, "jack").err().unwrap();
        assert!(matches!(err, SyncError::StorageInit { .. }));
        assert!(err.to_string().contains("tweet_id"));
    }

    #[test]
    fn test_unwritable_location_fails_init() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing-dir").join("x.db");
        let err = Storage::open(&path, "jack").err().unwrap();
        assert!(matches!(err, SyncError::StorageInit { .. }));
    }
}
