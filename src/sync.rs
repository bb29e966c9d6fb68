//! Pagination and deduplication loop.
//!
//! Walks a timeline backward one page at a time, stores every item the
//! database has not seen, and stops on the heuristic in [`should_stop`].
//!
//! ```text
//! Start -> Fetching -> ProcessingPage -> AdvancingCursor -> Fetching -> ...
//!                           |
//!                           +--> Done
//! ```
//!
//! The next cursor is the id of the *last* item processed on a page. That
//! relies on the upstream returning items newest first; out-of-order pages
//! would make the walk skip items. Any fetch, normalize or storage error
//! ends the run, and rows inserted before the failure stay in place, so a
//! rerun picks up where this one stopped.

use crate::error::Result;
use crate::fetch::Fetcher;
use crate::model::{Cursor, RawItem, Record, SyncSummary};
use crate::normalize::normalize;
use crate::storage::Storage;
use std::time::Duration;
use tracing::{debug, info};

/// States of one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Start,
    Fetching,
    ProcessingPage,
    AdvancingCursor,
    Done,
}

/// Termination policy.
///
/// The timeline API has no end-of-history marker besides returning fewer
/// items than asked for. A page of at most one item is treated as
/// exhaustion, and more than `page_size_bound` already-known items as having
/// caught up with a previous sync.
///
/// This can stop early when a run meets a long stretch of known posts with
/// unseen older posts behind it.
#[must_use]
pub fn should_stop(page: &[RawItem], running_known: u64, page_size_bound: u32) -> bool {
    page.len() <= 1 || running_known > u64::from(page_size_bound)
}

/// What happened to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Inserted under the given surrogate key.
    Stored(i64),
    /// Already in the database; skipped.
    Known,
}

/// Receives progress events from a [`Syncer`].
pub trait SyncObserver {
    /// Called after each item is stored or skipped.
    fn on_item(&mut self, _record: &Record, _outcome: ItemOutcome) {}

    /// Called after a page has been processed.
    fn on_page(&mut self, _page: u64, _items: usize, _summary: &SyncSummary) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}

/// Tunables of one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Items requested per page; also the known-item threshold.
    pub page_size: u32,
    /// Pause between page requests.
    pub sleep: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: crate::config::MAX_PAGE_SIZE,
            sleep: Duration::from_millis(crate::config::DEFAULT_SLEEP_MS),
        }
    }
}

/// Drives a [`Fetcher`] into a [`Storage`] until the timeline is caught up.
pub struct Syncer<'a, F: Fetcher + ?Sized> {
    fetcher: &'a F,
    storage: &'a Storage,
    options: SyncOptions,
}

impl<'a, F: Fetcher + ?Sized> Syncer<'a, F> {
    pub const fn new(fetcher: &'a F, storage: &'a Storage, options: SyncOptions) -> Self {
        Self {
            fetcher,
            storage,
            options,
        }
    }

    /// Run to completion without progress reporting.
    ///
    /// # Errors
    ///
    /// Returns the first fetch, normalization or storage error.
    pub async fn run(&self) -> Result<SyncSummary> {
        self.run_with(&mut NoopObserver).await
    }

    /// Run to completion, reporting progress to `observer`.
    ///
    /// # Errors
    ///
    /// Returns the first fetch, normalization or storage error.
    pub async fn run_with(&self, observer: &mut dyn SyncObserver) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();
        let mut cursor: Option<Cursor> = None;
        let mut page: Vec<RawItem> = Vec::new();
        let mut state = SyncState::Start;

        loop {
            debug!(?state, cursor = cursor.as_ref().map(Cursor::as_str), "Sync state");
            state = match state {
                SyncState::Start => SyncState::Fetching,
                SyncState::Fetching => {
                    page = self
                        .fetcher
                        .fetch_page(cursor.as_ref(), self.options.page_size)
                        .await?;
                    summary.pages += 1;
                    SyncState::ProcessingPage
                }
                SyncState::ProcessingPage => {
                    if should_stop(&page, summary.known_count, self.options.page_size) {
                        SyncState::Done
                    } else {
                        cursor = self.process_page(&page, &mut summary, observer)?;
                        observer.on_page(summary.pages, page.len(), &summary);
                        SyncState::AdvancingCursor
                    }
                }
                SyncState::AdvancingCursor => {
                    if !self.options.sleep.is_zero() {
                        tokio::time::sleep(self.options.sleep).await;
                    }
                    SyncState::Fetching
                }
                SyncState::Done => break,
            };
        }

        info!(
            new = summary.new_count,
            known = summary.known_count,
            pages = summary.pages,
            "Sync finished"
        );
        Ok(summary)
    }

    /// Store the unseen items of one page and return the next cursor.
    fn process_page(
        &self,
        page: &[RawItem],
        summary: &mut SyncSummary,
        observer: &mut dyn SyncObserver,
    ) -> Result<Option<Cursor>> {
        let mut next = None;
        for item in page {
            let record = normalize(item)?;
            next = Some(Cursor::new(record.external_id.clone()));

            let outcome = if self.storage.exists(&record.external_id)? {
                summary.known_count += 1;
                debug!(id = %record.external_id, "Already stored");
                ItemOutcome::Known
            } else {
                let local_id = self.storage.insert(&record)?;
                summary.new_count += 1;
                debug!(id = %record.external_id, local_id, "Stored");
                ItemOutcome::Stored(local_id)
            };
            observer.on_item(&record, outcome);
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Serves canned pages in order and records every cursor it was given.
    struct ScriptedFetcher {
        pages: Mutex<VecDeque<Result<Vec<RawItem>>>>,
        cursors: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedFetcher {
        fn new(pages: Vec<Vec<RawItem>>) -> Self {
            Self::with_results(pages.into_iter().map(Ok).collect())
        }

        fn with_results(pages: Vec<Result<Vec<RawItem>>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                cursors: Mutex::new(Vec::new()),
            }
        }

        fn cursors(&self) -> Vec<Option<String>> {
            self.cursors.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch_page(
            &self,
            cursor: Option<&Cursor>,
            _page_size: u32,
        ) -> Result<Vec<RawItem>> {
            self.cursors
                .lock()
                .unwrap()
                .push(cursor.map(|c| c.as_str().to_string()));
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        items: Vec<(String, ItemOutcome)>,
        pages: Vec<u64>,
    }

    impl SyncObserver for RecordingObserver {
        fn on_item(&mut self, record: &Record, outcome: ItemOutcome) {
            self.items.push((record.external_id.clone(), outcome));
        }

        fn on_page(&mut self, page: u64, _items: usize, _summary: &SyncSummary) {
            self.pages.push(page);
        }
    }

    fn tweet(id: u64) -> Value {
        json!({
            "id_str": id.to_string(),
            "full_text": format!("post number {id}"),
            "created_at": "Wed Jan 08 12:00:00 +0000 2025",
            "user": {"screen_name": "jack"},
        })
    }

    fn page(ids: &[u64]) -> Vec<RawItem> {
        ids.iter().copied().map(tweet).collect()
    }

    fn options(page_size: u32) -> SyncOptions {
        SyncOptions {
            page_size,
            sleep: Duration::ZERO,
        }
    }

    async fn run_sync(
        fetcher: &ScriptedFetcher,
        storage: &Storage,
        page_size: u32,
    ) -> Result<SyncSummary> {
        let syncer = Syncer::new(fetcher, storage, options(page_size));
        syncer.run().await
    }

    fn seed(storage: &Storage, ids: &[u64]) {
        for item in page(ids) {
            storage.insert(&normalize(&item).unwrap()).unwrap();
        }
    }

    #[test]
    fn should_stop_on_tiny_pages() {
        assert!(should_stop(&[], 0, 200));
        assert!(should_stop(&page(&[1]), 0, 200));
        assert!(!should_stop(&page(&[2, 1]), 0, 200));
    }

    #[test]
    fn should_stop_once_known_exceeds_bound() {
        let items = page(&[3, 2, 1]);
        assert!(!should_stop(&items, 200, 200));
        assert!(should_stop(&items, 201, 200));
    }

    #[tokio::test]
    async fn fresh_page_is_stored_and_cursor_advances() {
        let storage = Storage::open_memory("jack").unwrap();
        let fetcher = ScriptedFetcher::new(vec![page(&[5, 4, 3]), vec![]]);

        let summary = run_sync(&fetcher, &storage, 200).await.unwrap();

        assert_eq!(summary.new_count, 3);
        assert_eq!(summary.known_count, 0);
        assert_eq!(storage.count().unwrap(), 3);
        assert_eq!(fetcher.cursors(), vec![None, Some("3".to_string())]);
    }

    #[tokio::test]
    async fn known_items_are_counted_not_inserted() {
        let storage = Storage::open_memory("jack").unwrap();
        seed(&storage, &[4, 3]);
        let fetcher = ScriptedFetcher::new(vec![page(&[5, 4, 3])]);

        let summary = run_sync(&fetcher, &storage, 200).await.unwrap();

        assert_eq!(summary.new_count, 1);
        assert_eq!(summary.known_count, 2);
        assert_eq!(storage.count().unwrap(), 3);
        assert_eq!(storage.count_external_id("4").unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_first_page_finishes_immediately() {
        let storage = Storage::open_memory("jack").unwrap();
        let fetcher = ScriptedFetcher::new(vec![vec![]]);

        let summary = run_sync(&fetcher, &storage, 200).await.unwrap();

        assert_eq!(
            summary,
            SyncSummary {
                new_count: 0,
                known_count: 0,
                pages: 1,
            }
        );
        assert_eq!(fetcher.cursors(), vec![None]);
    }

    #[tokio::test]
    async fn singleton_page_is_not_processed() {
        let storage = Storage::open_memory("jack").unwrap();
        let fetcher = ScriptedFetcher::new(vec![page(&[9])]);

        let summary = run_sync(&fetcher, &storage, 200).await.unwrap();

        assert_eq!(summary.new_count, 0);
        assert!(!storage.exists("9").unwrap());
    }

    #[tokio::test]
    async fn malformed_item_aborts_and_keeps_earlier_inserts() {
        let storage = Storage::open_memory("jack").unwrap();
        let broken = json!({"id_str": "4", "user": {"screen_name": "jack"}});
        let fetcher = ScriptedFetcher::new(vec![vec![tweet(5), broken, tweet(3)]]);

        let err = run_sync(&fetcher, &storage, 200).await.unwrap_err();

        assert!(matches!(err, SyncError::MalformedItem { .. }));
        assert!(storage.exists("5").unwrap());
        assert!(!storage.exists("3").unwrap());
    }

    #[tokio::test]
    async fn fetch_error_aborts_with_partial_progress() {
        let storage = Storage::open_memory("jack").unwrap();
        let fetcher = ScriptedFetcher::with_results(vec![
            Ok(page(&[10, 9, 8])),
            Err(SyncError::RateLimit { retry_after: None }),
        ]);

        let err = run_sync(&fetcher, &storage, 200).await.unwrap_err();

        assert!(matches!(err, SyncError::RateLimit { .. }));
        assert_eq!(storage.count().unwrap(), 3);
    }

    #[tokio::test]
    async fn second_run_over_same_pages_adds_nothing() {
        let storage = Storage::open_memory("jack").unwrap();
        let pages = || vec![page(&[30, 29, 28]), page(&[27, 26]), page(&[25])];

        let first = run_sync(&ScriptedFetcher::new(pages()), &storage, 200)
            .await
            .unwrap();
        let second = run_sync(&ScriptedFetcher::new(pages()), &storage, 200)
            .await
            .unwrap();

        assert_eq!(first.new_count, 5);
        assert_eq!(second.new_count, 0);
        assert_eq!(second.known_count, 5);
        for id in 26..=30 {
            assert_eq!(storage.count_external_id(&id.to_string()).unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn duplicates_within_a_run_are_stored_once() {
        let storage = Storage::open_memory("jack").unwrap();
        // Overlapping pages, as an inclusive max_id would produce.
        let fetcher = ScriptedFetcher::new(vec![page(&[6, 5, 4]), page(&[4, 3, 2]), vec![]]);

        let summary = run_sync(&fetcher, &storage, 200).await.unwrap();

        assert_eq!(summary.new_count, 5);
        assert_eq!(summary.known_count, 1);
        assert_eq!(storage.count_external_id("4").unwrap(), 1);
    }

    #[tokio::test]
    async fn stops_after_known_threshold_is_crossed() {
        let storage = Storage::open_memory("jack").unwrap();
        seed(&storage, &[8, 7, 6, 5, 4, 3]);
        // Page size 2: with 4 known items the third page ends the run even
        // though it holds unseen items.
        let fetcher = ScriptedFetcher::new(vec![
            page(&[8, 7]),
            page(&[6, 5]),
            page(&[2, 1]),
        ]);

        let summary = run_sync(&fetcher, &storage, 2).await.unwrap();

        assert_eq!(summary.known_count, 4);
        assert_eq!(summary.new_count, 0);
        assert!(!storage.exists("2").unwrap());
        assert_eq!(fetcher.cursors().len(), 3);
    }

    #[tokio::test]
    async fn cursors_come_from_previous_page_without_repeats() {
        let storage = Storage::open_memory("jack").unwrap();
        let pages = vec![page(&[50, 49, 48]), page(&[47, 46, 45]), page(&[44, 43]), vec![]];
        let fetcher = ScriptedFetcher::new(pages.clone());

        run_sync(&fetcher, &storage, 200).await.unwrap();

        let cursors = fetcher.cursors();
        assert_eq!(cursors[0], None);
        for (i, cursor) in cursors.iter().enumerate().skip(1) {
            let previous = &pages[i - 1];
            let last_id = previous.last().unwrap()["id_str"].as_str().unwrap();
            assert_eq!(cursor.as_deref(), Some(last_id));
        }
        let mut seen = cursors.clone();
        seen.dedup();
        assert_eq!(seen.len(), cursors.len());
    }

    #[tokio::test]
    async fn terminates_when_fetcher_runs_dry() {
        let storage = Storage::open_memory("jack").unwrap();
        let pages: Vec<Vec<RawItem>> = (0..20u64)
            .map(|n| page(&[1000 - n * 2, 999 - n * 2]))
            .chain(std::iter::once(page(&[1])))
            .collect();
        let fetcher = ScriptedFetcher::new(pages);

        let summary = run_sync(&fetcher, &storage, 200).await.unwrap();

        assert_eq!(summary.pages, 21);
        assert_eq!(summary.new_count, 40);
    }

    #[tokio::test]
    async fn observer_sees_every_item_and_page() {
        let storage = Storage::open_memory("jack").unwrap();
        seed(&storage, &[3]);
        let fetcher = ScriptedFetcher::new(vec![page(&[4, 3]), vec![]]);
        let mut observer = RecordingObserver::default();

        Syncer::new(&fetcher, &storage, options(200))
            .run_with(&mut observer)
            .await
            .unwrap();

        assert_eq!(observer.items.len(), 2);
        assert!(matches!(observer.items[0], (ref id, ItemOutcome::Stored(_)) if id == "4"));
        assert_eq!(observer.items[1], ("3".to_string(), ItemOutcome::Known));
        assert_eq!(observer.pages, vec![1]);
    }
}
