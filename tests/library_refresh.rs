//! Integration tests for library-wide refresh runs.
//!
//! Entries live in an in-memory SQLite database; sources and the download
//! index are scripted doubles so failures and timing can be controlled.

mod common;

use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::{chapter, clock, manga, test_db, RecordingDownloads, ScriptedSource};
use shelfsync::media::{
    CategoryId, Chapter, Entry, EntryDetails, EntryStatus, LibraryItem, MediaKind, RemoteItem,
};
use shelfsync::notify::{NewItemsNotice, NotificationSink};
use shelfsync::source::{SourceClient, SourceError, SourceRegistry};
use shelfsync::storage::Database;
use shelfsync::sync::{
    LibraryPreferences, LibraryRefreshCoordinator, RefreshSummary, SkipReason, SkippedEntry,
};

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default)]
struct RecordingNotifier {
    peak_in_flight: AtomicUsize,
    new_items: Mutex<Vec<(String, Vec<String>)>>,
    skipped: Mutex<Vec<(String, SkipReason)>>,
    failed: Mutex<Vec<(usize, Option<PathBuf>)>>,
    warnings: Mutex<Vec<(String, usize)>>,
}

impl NotificationSink for RecordingNotifier {
    fn progress(&self, in_flight: &[String], _completed: usize, _total: usize) {
        self.peak_in_flight.fetch_max(in_flight.len(), Ordering::SeqCst);
    }

    fn queue_size_warning(&self, source: &str, entries: usize) {
        self.warnings
            .lock()
            .unwrap()
            .push((source.to_string(), entries));
    }

    fn new_items(&self, _kind: MediaKind, notices: &[NewItemsNotice]) {
        self.new_items.lock().unwrap().extend(
            notices
                .iter()
                .map(|n| (n.entry.title.clone(), n.item_names.clone())),
        );
    }

    fn skipped(&self, _kind: MediaKind, skipped: &[SkippedEntry]) {
        self.skipped.lock().unwrap().extend(
            skipped
                .iter()
                .map(|s| (s.entry.title.clone(), s.reason)),
        );
    }

    fn failed(&self, _kind: MediaKind, count: usize, report: Option<&Path>) {
        self.failed
            .lock()
            .unwrap()
            .push((count, report.map(Path::to_path_buf)));
    }
}

struct Harness {
    db: Database,
    sources: SourceRegistry,
    downloads: Arc<RecordingDownloads>,
    notifier: Arc<RecordingNotifier>,
    prefs: LibraryPreferences,
    reports: tempfile::TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self {
            db: test_db().await,
            sources: SourceRegistry::new(),
            downloads: Arc::new(RecordingDownloads::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            prefs: LibraryPreferences::default(),
            reports: tempfile::tempdir().unwrap(),
        }
    }

    fn register(&mut self, source: Arc<dyn SourceClient>) {
        self.sources.register(source);
    }

    fn coordinator(&self) -> LibraryRefreshCoordinator<Chapter> {
        LibraryRefreshCoordinator::new(
            Arc::new(self.db.clone()),
            self.sources.clone(),
            self.downloads.clone(),
            clock(),
            self.prefs.clone(),
        )
        .with_notifier(self.notifier.clone())
        .with_report_dir(self.reports.path())
    }

    async fn run(&self) -> RefreshSummary<Chapter> {
        self.coordinator()
            .run(None, CancellationToken::new())
            .await
            .unwrap()
    }
}

fn listing(prefix: &str, count: usize) -> Vec<RemoteItem> {
    (1..=count)
        .rev()
        .map(|n| chapter(&format!("{prefix}/{n}"), &format!("Chapter {n}")))
        .collect()
}

fn updated_titles(summary: &RefreshSummary<Chapter>) -> Vec<String> {
    let mut titles: Vec<String> = summary
        .updated
        .iter()
        .map(|u| u.entry.title.clone())
        .collect();
    titles.sort();
    titles
}

// ============================================================================
// Failure isolation
// ============================================================================

#[tokio::test]
async fn test_failing_entry_does_not_stop_the_others() {
    let mut h = Harness::new().await;
    for id in 1..=3 {
        manga(&h.db, id, &format!("/e{id}"), &format!("Entry {id}")).await;
    }
    h.register(Arc::new(ScriptedSource::new(1, listing("/e1", 2))));
    h.register(Arc::new(ScriptedSource::failing(2, "connection reset")));
    h.register(Arc::new(ScriptedSource::new(3, listing("/e3", 1))));

    let summary = h.run().await;

    assert_eq!(updated_titles(&summary), vec!["Entry 1", "Entry 3"]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].entry.title, "Entry 2");
    assert_eq!(summary.failed[0].message, "connection reset");
    assert_eq!(summary.processed, 3);
    assert!(!summary.cancelled);
}

#[tokio::test]
async fn test_failure_report_is_written() {
    let mut h = Harness::new().await;
    manga(&h.db, 2, "/broken", "Broken").await;
    manga(&h.db, 4, "/empty", "Empty").await;
    manga(&h.db, 9, "/orphan", "Orphan").await;
    h.register(Arc::new(ScriptedSource::failing(2, "timed out")));
    h.register(Arc::new(ScriptedSource::new(4, Vec::new())));

    let summary = h.run().await;

    let report_path = summary.report.clone().expect("report written");
    assert_eq!(report_path, h.reports.path().join("manga_update_errors.txt"));
    let report = std::fs::read_to_string(&report_path).unwrap();
    assert_eq!(
        report,
        "! No chapters found\n  # Scripted 4\n    - Empty\n\
         ! Source not installed\n  # Source 9 (not installed)\n    - Orphan\n\
         ! timed out\n  # Scripted 2\n    - Broken\n"
    );
    assert_eq!(
        *h.notifier.failed.lock().unwrap(),
        vec![(3, Some(report_path))]
    );
}

#[tokio::test]
async fn test_clean_run_writes_no_report() {
    let mut h = Harness::new().await;
    manga(&h.db, 1, "/ok", "Fine").await;
    h.register(Arc::new(ScriptedSource::new(1, listing("/ok", 1))));

    let summary = h.run().await;

    assert!(summary.failed.is_empty());
    assert_eq!(summary.report, None);
    assert!(h.notifier.failed.lock().unwrap().is_empty());
}

// ============================================================================
// Concurrency and cancellation
// ============================================================================

#[tokio::test]
async fn test_at_most_five_sources_in_flight() {
    let mut h = Harness::new().await;
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    for id in 1..=10 {
        manga(&h.db, id, &format!("/e{id}"), &format!("Entry {id:02}")).await;
        h.register(Arc::new(
            ScriptedSource::new(id, listing(&format!("/e{id}"), 1)).slow(
                Duration::from_millis(30),
                in_flight.clone(),
                peak.clone(),
            ),
        ));
    }

    let summary = h.run().await;

    assert_eq!(summary.updated.len(), 10);
    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= 5, "{peak} listings ran at once");
    assert!(peak > 1, "sources were refreshed one at a time");
    assert!(h.notifier.peak_in_flight.load(Ordering::SeqCst) <= 5);
}

#[tokio::test]
async fn test_one_source_is_refreshed_serially() {
    let mut h = Harness::new().await;
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    for n in 1..=4 {
        manga(&h.db, 1, &format!("/e{n}"), &format!("Entry {n}")).await;
    }
    let source = Arc::new(
        ScriptedSource::new(1, listing("/shared", 1)).slow(
            Duration::from_millis(10),
            in_flight,
            peak.clone(),
        ),
    );
    h.register(source.clone());

    h.run().await;

    assert_eq!(source.calls(), 4);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_run_refreshes_nothing() {
    let mut h = Harness::new().await;
    let entry = manga(&h.db, 1, "/e1", "Entry").await;
    let source = Arc::new(ScriptedSource::new(1, listing("/e1", 3)));
    h.register(source.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = h.coordinator().run(None, cancel).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.processed, 0);
    assert_eq!(source.calls(), 0);
    assert!(h.db.items_for_entry::<Chapter>(entry.id).await.unwrap().is_empty());
}

// ============================================================================
// Selection
// ============================================================================

#[tokio::test]
async fn test_restricted_entries_are_reported_as_skipped() {
    let mut h = Harness::new().await;
    let done = manga(&h.db, 1, "/done", "Done").await;
    h.db.apply_details(
        done.id,
        &EntryDetails {
            status: Some(EntryStatus::Completed),
            ..EntryDetails::default()
        },
    )
    .await
    .unwrap();
    manga(&h.db, 1, "/going", "Going").await;
    let source = Arc::new(ScriptedSource::new(1, listing("/x", 1)));
    h.register(source.clone());

    let summary = h.run().await;

    assert_eq!(source.calls(), 1);
    assert_eq!(updated_titles(&summary), vec!["Going"]);
    assert_eq!(
        *h.notifier.skipped.lock().unwrap(),
        vec![("Done".to_string(), SkipReason::Completed)]
    );
}

#[tokio::test]
async fn test_unfavorited_entries_are_ignored() {
    let mut h = Harness::new().await;
    let gone = manga(&h.db, 1, "/gone", "Gone").await;
    h.db.set_favorite(gone.id, false).await.unwrap();
    let source = Arc::new(ScriptedSource::new(1, listing("/gone", 1)));
    h.register(source.clone());

    let summary = h.run().await;

    assert_eq!(source.calls(), 0);
    assert!(summary.updated.is_empty());
    assert!(summary.skipped.is_empty());
}

#[tokio::test]
async fn test_category_run_only_touches_that_category() {
    let mut h = Harness::new().await;
    let reading = h.db.create_category(MediaKind::Manga, "Reading").await.unwrap();
    let inside = manga(&h.db, 1, "/in", "Inside").await;
    manga(&h.db, 1, "/out", "Outside").await;
    h.db.set_entry_categories(inside.id, &[reading]).await.unwrap();
    h.register(Arc::new(ScriptedSource::new(1, listing("/x", 1))));

    let summary = h
        .coordinator()
        .run(Some(reading), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(updated_titles(&summary), vec!["Inside"]);
}

#[tokio::test]
async fn test_crowded_metered_source_warns() {
    let mut h = Harness::new().await;
    h.prefs.queue_warning_threshold = 2;
    for n in 1..=3 {
        manga(&h.db, 5, &format!("/e{n}"), &format!("Entry {n}")).await;
    }
    h.register(Arc::new(ScriptedSource::new(5, listing("/x", 1))));

    h.run().await;

    assert_eq!(
        *h.notifier.warnings.lock().unwrap(),
        vec![("Scripted 5".to_string(), 3)]
    );
}

#[tokio::test]
async fn test_local_source_never_warns() {
    let mut h = Harness::new().await;
    h.prefs.queue_warning_threshold = 1;
    for n in 1..=3 {
        manga(&h.db, 0, &format!("/e{n}"), &format!("Entry {n}")).await;
    }
    h.register(Arc::new(ScriptedSource::new(0, Vec::new()).local()));

    let summary = h.run().await;

    assert!(h.notifier.warnings.lock().unwrap().is_empty());
    assert!(summary.failed.is_empty());
}

// ============================================================================
// Results, metadata and downloads
// ============================================================================

#[tokio::test]
async fn test_new_items_are_reported_oldest_first() {
    let mut h = Harness::new().await;
    manga(&h.db, 1, "/e1", "Entry").await;
    h.register(Arc::new(ScriptedSource::new(1, listing("/e1", 3))));

    let summary = h.run().await;

    let names: Vec<&str> = summary.updated[0]
        .new_items
        .iter()
        .map(|c| c.core().name.as_str())
        .collect();
    assert_eq!(names, vec!["Chapter 1", "Chapter 2", "Chapter 3"]);
    assert_eq!(
        *h.notifier.new_items.lock().unwrap(),
        vec![(
            "Entry".to_string(),
            vec!["Chapter 1".to_string(), "Chapter 2".to_string(), "Chapter 3".to_string()]
        )]
    );

    let second = h.run().await;
    assert!(second.updated.is_empty());
}

#[tokio::test]
async fn test_metadata_refreshed_when_enabled() {
    struct Describing(ScriptedSource);

    #[async_trait::async_trait]
    impl SourceClient for Describing {
        fn id(&self) -> i64 {
            self.0.id()
        }
        fn name(&self) -> &str {
            self.0.name()
        }
        async fn item_list(
            &self,
            entry: &shelfsync::media::Entry,
        ) -> Result<Vec<RemoteItem>, shelfsync::source::SourceError> {
            self.0.item_list(entry).await
        }
        async fn details(
            &self,
            _entry: &shelfsync::media::Entry,
        ) -> Result<Option<EntryDetails>, shelfsync::source::SourceError> {
            Ok(Some(EntryDetails {
                author: Some("Author".into()),
                ..EntryDetails::default()
            }))
        }
    }

    let mut h = Harness::new().await;
    h.prefs.auto_update_metadata = true;
    let entry = manga(&h.db, 1, "/e1", "Entry").await;
    h.register(Arc::new(Describing(ScriptedSource::new(1, listing("/e1", 1)))));

    h.run().await;

    let stored = h.db.get_entry(entry.id).await.unwrap().unwrap();
    assert_eq!(stored.author.as_deref(), Some("Author"));
}

#[tokio::test]
async fn test_downloads_queued_once_per_run() {
    let mut h = Harness::new().await;
    h.prefs.downloads.download_new = true;
    manga(&h.db, 1, "/a", "A").await;
    manga(&h.db, 2, "/b", "B").await;
    h.register(Arc::new(ScriptedSource::new(1, listing("/a", 2))));
    h.register(Arc::new(ScriptedSource::new(2, listing("/b", 1))));

    let summary = h.run().await;

    assert!(summary.downloads_triggered);
    assert_eq!(h.downloads.queued.lock().unwrap().len(), 3);
    assert_eq!(h.downloads.starts(), 1);
}

#[tokio::test]
async fn test_downloads_respect_category_policy() {
    let mut h = Harness::new().await;
    let skip = h.db.create_category(MediaKind::Manga, "No downloads").await.unwrap();
    h.prefs.downloads.download_new = true;
    h.prefs.downloads.exclude_categories = vec![skip];
    let entry = manga(&h.db, 1, "/a", "A").await;
    h.db.set_entry_categories(entry.id, &[skip]).await.unwrap();
    h.register(Arc::new(ScriptedSource::new(1, listing("/a", 2))));

    let summary = h.run().await;

    assert_eq!(summary.updated.len(), 1);
    assert!(!summary.downloads_triggered);
    assert!(h.downloads.queued.lock().unwrap().is_empty());
    assert_eq!(h.downloads.starts(), 0);
}

// ============================================================================
// Library changes while a listing is in flight
// ============================================================================

enum Interference {
    Unfavorite,
    MoveSource(i64),
    MoveToCategory(CategoryId),
    Cancel(CancellationToken),
}

/// Source that changes the library, or cancels the run, while its listing
/// is being fetched.
struct Interfering {
    inner: ScriptedSource,
    db: Database,
    action: Interference,
}

impl Interfering {
    fn new(inner: ScriptedSource, db: &Database, action: Interference) -> Self {
        Self {
            inner,
            db: db.clone(),
            action,
        }
    }
}

#[async_trait::async_trait]
impl SourceClient for Interfering {
    fn id(&self) -> i64 {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn item_list(&self, entry: &Entry) -> Result<Vec<RemoteItem>, SourceError> {
        match &self.action {
            Interference::Unfavorite => self.db.set_favorite(entry.id, false).await.unwrap(),
            Interference::MoveSource(to) => self.db.set_entry_source(entry.id, *to).await.unwrap(),
            Interference::MoveToCategory(category) => self
                .db
                .set_entry_categories(entry.id, &[*category])
                .await
                .unwrap(),
            Interference::Cancel(token) => token.cancel(),
        }
        self.inner.item_list(entry).await
    }
}

#[tokio::test]
async fn test_entry_unfavorited_during_listing_is_dropped_silently() {
    let mut h = Harness::new().await;
    let entry = manga(&h.db, 1, "/e1", "Entry").await;
    let source = Arc::new(Interfering::new(
        ScriptedSource::new(1, listing("/e1", 3)),
        &h.db,
        Interference::Unfavorite,
    ));
    h.register(source.clone());

    let summary = h.run().await;

    assert_eq!(source.inner.calls(), 1);
    assert_eq!(summary.processed, 1);
    assert!(summary.updated.is_empty());
    assert!(summary.failed.is_empty());
    assert!(summary.report.is_none());
    assert!(h.db.items_for_entry::<Chapter>(entry.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_during_first_entry_stops_the_partition() {
    let mut h = Harness::new().await;
    let first = manga(&h.db, 1, "/a", "A").await;
    let second = manga(&h.db, 1, "/b", "B").await;
    let third = manga(&h.db, 1, "/c", "C").await;
    let cancel = CancellationToken::new();
    let source = Arc::new(Interfering::new(
        ScriptedSource::new(1, listing("/x", 2)),
        &h.db,
        Interference::Cancel(cancel.clone()),
    ));
    h.register(source.clone());

    let summary = h.coordinator().run(None, cancel).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(source.inner.calls(), 1);
    assert_eq!(summary.processed, 1);
    // The entry in progress still finishes
    assert_eq!(updated_titles(&summary), vec!["A"]);
    assert_eq!(h.db.items_for_entry::<Chapter>(first.id).await.unwrap().len(), 2);
    for later in [second, third] {
        assert!(h.db.items_for_entry::<Chapter>(later.id).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_entry_moved_to_another_source_fails() {
    let mut h = Harness::new().await;
    let entry = manga(&h.db, 1, "/e1", "Entry").await;
    h.register(Arc::new(Interfering::new(
        ScriptedSource::new(1, listing("/e1", 2)),
        &h.db,
        Interference::MoveSource(2),
    )));

    let summary = h.run().await;

    assert_eq!(summary.failed.len(), 1);
    assert_eq!(
        summary.failed[0].message,
        "Data integrity error: entry moved from source 1 to 2 during refresh"
    );
    assert!(h.db.items_for_entry::<Chapter>(entry.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_download_policy_uses_current_categories() {
    let mut h = Harness::new().await;
    let skip = h.db.create_category(MediaKind::Manga, "No downloads").await.unwrap();
    h.prefs.downloads.download_new = true;
    h.prefs.downloads.exclude_categories = vec![skip];
    manga(&h.db, 1, "/a", "A").await;
    h.register(Arc::new(Interfering::new(
        ScriptedSource::new(1, listing("/a", 2)),
        &h.db,
        Interference::MoveToCategory(skip),
    )));

    let summary = h.run().await;

    assert_eq!(updated_titles(&summary), vec!["A"]);
    assert!(!summary.downloads_triggered);
    assert!(h.downloads.queued.lock().unwrap().is_empty());
}
