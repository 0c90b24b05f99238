//! Library-wide refresh.
//!
//! A run selects eligible entries, groups them by source and refreshes up to
//! `max_concurrent_sources` sources at once. Entries of one source are
//! refreshed one after another so a single backend never sees parallel
//! requests from us.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

use super::error::SyncError;
use super::interval::FetchWindow;
use super::options::LibraryPreferences;
use super::reconcile::ReconciliationEngine;
use super::recognition::NumberRecognizer;
use super::report::{write_error_report, FailedEntry};
use super::repository::ContentRepository;
use super::selection::{select_entries, Selection, SkippedEntry};
use crate::clock::Clock;
use crate::download::{DownloadIndex, DownloadRequest};
use crate::media::{CategoryId, Entry, EntryId, LibraryEntry, LibraryItem, MediaKind, SourceId};
use crate::notify::{NewItemsNotice, NotificationSink, TracingNotifier};
use crate::scheduler::RefreshJob;
use crate::source::SourceRegistry;

/// Entry that gained items in a run.
#[derive(Debug, Clone)]
pub struct UpdatedEntry<I> {
    pub entry: Entry,
    /// Ordered by source order, descending
    pub new_items: Vec<I>,
}

/// Everything a run did, for callers and tests.
#[derive(Debug)]
pub struct RefreshSummary<I> {
    pub kind: MediaKind,
    pub updated: Vec<UpdatedEntry<I>>,
    pub failed: Vec<FailedEntry>,
    pub skipped: Vec<SkippedEntry>,
    /// Entries that went through a refresh attempt
    pub processed: usize,
    pub downloads_triggered: bool,
    pub cancelled: bool,
    pub report: Option<PathBuf>,
}

enum UnitResult<I> {
    Updated {
        update: UpdatedEntry<I>,
        downloads_triggered: bool,
    },
    Unchanged,
    Failed(FailedEntry),
}

/// In-flight titles and completion counter shared by all partitions.
struct ProgressTracker {
    in_flight: Mutex<Vec<(EntryId, String)>>,
    completed: AtomicUsize,
    total: usize,
}

impl ProgressTracker {
    fn new(total: usize) -> Self {
        Self {
            in_flight: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
            total,
        }
    }

    fn titles(in_flight: &[(EntryId, String)]) -> Vec<String> {
        in_flight.iter().map(|(_, title)| title.clone()).collect()
    }

    fn start(&self, entry: &Entry, notifier: &dyn NotificationSink) {
        let titles = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            in_flight.push((entry.id, entry.title.clone()));
            Self::titles(&in_flight)
        };
        notifier.progress(&titles, self.completed.load(Ordering::Relaxed), self.total);
    }

    fn finish(&self, entry: &Entry, notifier: &dyn NotificationSink) {
        let titles = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(pos) = in_flight.iter().position(|(id, _)| *id == entry.id) {
                in_flight.remove(pos);
            }
            Self::titles(&in_flight)
        };
        let done = self.completed.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        notifier.progress(&titles, done, self.total);
    }

    fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }
}

pub struct LibraryRefreshCoordinator<I: LibraryItem> {
    repo: Arc<dyn ContentRepository<I>>,
    sources: SourceRegistry,
    downloads: Arc<dyn DownloadIndex>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    engine: ReconciliationEngine<I>,
    prefs: LibraryPreferences,
    report_dir: PathBuf,
}

impl<I: LibraryItem> LibraryRefreshCoordinator<I> {
    pub fn new(
        repo: Arc<dyn ContentRepository<I>>,
        sources: SourceRegistry,
        downloads: Arc<dyn DownloadIndex>,
        clock: Arc<dyn Clock>,
        prefs: LibraryPreferences,
    ) -> Self {
        let engine = ReconciliationEngine::new(repo.clone(), downloads.clone(), clock.clone())
            .mark_duplicate_read_as_read(prefs.mark_duplicate_read_as_read);
        Self {
            repo,
            sources,
            downloads,
            notifier: Arc::new(TracingNotifier),
            clock,
            engine,
            prefs,
            report_dir: std::env::temp_dir(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Recognizer for item numbers in place of the default pattern rules.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn NumberRecognizer>) -> Self {
        self.engine = self.engine.with_recognizer(recognizer);
        self
    }

    /// Directory the failure report is written to.
    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = dir.into();
        self
    }

    /// Refresh the library (or one category of it).
    ///
    /// Per-entry failures are recorded in the summary; only failing to load
    /// the library itself is an error.
    pub async fn run(
        &self,
        category: Option<CategoryId>,
        cancel: CancellationToken,
    ) -> Result<RefreshSummary<I>> {
        let kind = I::KIND;
        let window = self.engine.estimator().window(self.clock.now());
        let library = self
            .repo
            .library()
            .await
            .with_context(|| format!("Failed to load {kind} library"))?;

        let Selection { eligible, skipped } =
            select_entries(library, category, &self.prefs, window);
        self.warn_crowded_source(&eligible);
        tracing::info!(
            kind = %kind,
            eligible = eligible.len(),
            skipped = skipped.len(),
            "Starting library refresh"
        );

        let mut partitions: BTreeMap<SourceId, Vec<LibraryEntry>> = BTreeMap::new();
        for candidate in eligible {
            partitions
                .entry(candidate.entry.source)
                .or_default()
                .push(candidate);
        }
        let total = partitions.values().map(Vec::len).sum();
        let progress = ProgressTracker::new(total);

        let results: Vec<Vec<UnitResult<I>>> = stream::iter(partitions.into_values())
            .map(|entries| self.refresh_partition(entries, window, &progress, &cancel))
            .buffer_unordered(self.prefs.max_concurrent_sources.max(1))
            .collect()
            .await;

        let mut summary = RefreshSummary {
            kind,
            updated: Vec::new(),
            failed: Vec::new(),
            skipped,
            processed: progress.completed(),
            downloads_triggered: false,
            cancelled: cancel.is_cancelled(),
            report: None,
        };
        for result in results.into_iter().flatten() {
            match result {
                UnitResult::Updated {
                    update,
                    downloads_triggered,
                } => {
                    summary.downloads_triggered |= downloads_triggered;
                    summary.updated.push(update);
                }
                UnitResult::Unchanged => {}
                UnitResult::Failed(failure) => summary.failed.push(failure),
            }
        }

        self.finish_run(&mut summary).await;
        Ok(summary)
    }

    async fn refresh_partition(
        &self,
        entries: Vec<LibraryEntry>,
        window: FetchWindow,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Vec<UnitResult<I>> {
        let mut results = Vec::with_capacity(entries.len());
        for candidate in entries {
            if cancel.is_cancelled() {
                break;
            }
            let entry = &candidate.entry;
            progress.start(entry, self.notifier.as_ref());

            let result = match self.refresh_entry(entry, window).await {
                Ok(Some(mut new_items)) if !new_items.is_empty() => {
                    new_items.sort_by(|a, b| b.core().source_order.cmp(&a.core().source_order));
                    let downloads_triggered =
                        self.queue_downloads(entry, &candidate.categories, &new_items).await;
                    UnitResult::Updated {
                        update: UpdatedEntry {
                            entry: entry.clone(),
                            new_items,
                        },
                        downloads_triggered,
                    }
                }
                Ok(_) => UnitResult::Unchanged,
                Err(e) => {
                    tracing::warn!(
                        entry_id = entry.id,
                        title = %entry.title,
                        error = %e,
                        "Entry refresh failed"
                    );
                    UnitResult::Failed(FailedEntry {
                        entry: entry.clone(),
                        message: self.failure_message(&e),
                    })
                }
            };

            progress.finish(entry, self.notifier.as_ref());
            results.push(result);
            if cancel.is_cancelled() {
                break;
            }
        }
        results
    }

    /// `Ok(None)` when the entry left the library before or during the
    /// refresh.
    async fn refresh_entry(
        &self,
        entry: &Entry,
        window: FetchWindow,
    ) -> Result<Option<Vec<I>>, SyncError> {
        let Some(current) = self.repo.entry(entry.id).await?.filter(|e| e.favorite) else {
            tracing::debug!(entry_id = entry.id, "Entry no longer in library");
            return Ok(None);
        };
        let source = self.sources.get(current.source)?;

        if self.prefs.auto_update_metadata {
            if let Some(details) = source.details(&current).await? {
                if !details.is_empty() {
                    self.repo.apply_details(current.id, &details).await?;
                }
            }
        }

        let listing = source.item_list(&current).await?;

        // The user may have removed the entry while the listing was in flight
        let Some(latest) = self.repo.entry(entry.id).await?.filter(|e| e.favorite) else {
            tracing::debug!(entry_id = entry.id, "Entry removed during refresh");
            return Ok(None);
        };
        if latest.source != current.source {
            return Err(SyncError::DataIntegrity(format!(
                "entry moved from source {} to {} during refresh",
                current.source, latest.source
            )));
        }

        let outcome = self
            .engine
            .reconcile(listing, &latest, source.as_ref(), false, Some(window))
            .await?;
        Ok(Some(outcome.new_items))
    }

    /// `selected_in` is the membership seen at selection time, used when the
    /// current one cannot be read.
    async fn queue_downloads(
        &self,
        entry: &Entry,
        selected_in: &[CategoryId],
        new_items: &[I],
    ) -> bool {
        let categories = match self.repo.entry_categories(entry.id).await {
            Ok(categories) => categories,
            Err(e) => {
                tracing::warn!(entry_id = entry.id, error = %e, "Failed to read entry categories");
                selected_in.to_vec()
            }
        };
        if !self.prefs.downloads.should_download(&categories) {
            return false;
        }
        let requests = new_items
            .iter()
            .filter(|item| !item.core().read)
            .map(|item| DownloadRequest {
                item_id: item.core().id,
                key: item.download_key(),
                name: item.core().name.clone(),
            })
            .collect::<Vec<_>>();
        if requests.is_empty() {
            return false;
        }
        match self.downloads.enqueue(entry, requests).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(entry_id = entry.id, error = %e, "Failed to queue downloads");
                false
            }
        }
    }

    fn failure_message(&self, err: &SyncError) -> String {
        match err {
            SyncError::EmptyRemoteListing => I::KIND.no_items_message().to_string(),
            SyncError::BackendUnavailable(_) => "Source not installed".to_string(),
            other => other.to_string(),
        }
    }

    fn warn_crowded_source(&self, eligible: &[LibraryEntry]) {
        let mut per_source: HashMap<SourceId, usize> = HashMap::new();
        for candidate in eligible {
            *per_source.entry(candidate.entry.source).or_default() += 1;
        }
        let crowded = per_source
            .into_iter()
            .filter(|(source, _)| !self.sources.is_unmetered(*source))
            .filter(|(_, count)| *count > self.prefs.queue_warning_threshold)
            .max_by_key(|(_, count)| *count);
        if let Some((source, count)) = crowded {
            self.notifier
                .queue_size_warning(&self.sources.display_name(source), count);
        }
    }

    async fn finish_run(&self, summary: &mut RefreshSummary<I>) {
        let kind = summary.kind;

        if !summary.updated.is_empty() {
            let notices: Vec<NewItemsNotice> = summary
                .updated
                .iter()
                .map(|u| NewItemsNotice {
                    entry: u.entry.clone(),
                    item_names: u.new_items.iter().map(|i| i.core().name.clone()).collect(),
                })
                .collect();
            self.notifier.new_items(kind, &notices);
        }

        if !summary.skipped.is_empty() {
            self.notifier.skipped(kind, &summary.skipped);
        }

        if !summary.failed.is_empty() {
            let sources = &self.sources;
            match write_error_report(&self.report_dir, kind, &summary.failed, |id| {
                sources.display_name(id)
            })
            .await
            {
                Ok(path) => summary.report = Some(path),
                Err(e) => tracing::warn!(error = %e, "Failed to write error report"),
            }
            self.notifier
                .failed(kind, summary.failed.len(), summary.report.as_deref());
        }

        if summary.downloads_triggered {
            self.downloads.start_queue().await;
        }

        tracing::info!(
            kind = %kind,
            processed = summary.processed,
            updated = summary.updated.len(),
            failed = summary.failed.len(),
            cancelled = summary.cancelled,
            "Library refresh finished"
        );
    }
}

#[async_trait]
impl<I: LibraryItem> RefreshJob for LibraryRefreshCoordinator<I> {
    fn name(&self) -> &str {
        I::KIND.as_str()
    }

    async fn run(&self, category: Option<CategoryId>, cancel: CancellationToken) -> Result<()> {
        LibraryRefreshCoordinator::run(self, category, cancel).await?;
        Ok(())
    }
}
