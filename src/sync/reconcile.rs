use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use super::error::SyncError;
use super::interval::{FetchIntervalEstimator, FetchWindow};
use super::recognition::{NumberRecognizer, PatternRecognizer};
use super::repository::ContentRepository;
use crate::clock::Clock;
use crate::download::DownloadIndex;
use crate::media::{Entry, ItemCore, ItemId, ItemNumber, LibraryItem, RemoteItem};
use crate::source::SourceClient;
use crate::util::sanitize_item_name;

/// Result of merging one listing into an entry.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome<I> {
    /// Inserted items the user has not seen before, in listing order
    pub new_items: Vec<I>,
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    /// False when any write at the commit boundary failed
    pub committed: bool,
}

impl<I> ReconcileOutcome<I> {
    fn unchanged() -> Self {
        Self {
            new_items: Vec::new(),
            added: 0,
            removed: 0,
            changed: 0,
            committed: true,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.changed == 0
    }
}

/// State carried over from items that vanished from the listing, keyed by
/// recognized number.
#[derive(Default)]
struct Removed {
    read: HashSet<u64>,
    bookmarked: HashSet<u64>,
    latest_fetch: HashMap<u64, i64>,
}

impl Removed {
    fn collect<I: LibraryItem>(items: &[I]) -> Self {
        let mut removed = Removed::default();
        for item in items {
            let core = item.core();
            let Some(key) = core.number.key() else {
                continue;
            };
            if core.read {
                removed.read.insert(key);
            }
            if core.bookmark {
                removed.bookmarked.insert(key);
            }
            removed
                .latest_fetch
                .entry(key)
                .and_modify(|at| *at = (*at).max(core.date_fetch))
                .or_insert(core.date_fetch);
        }
        removed
    }
}

/// Merges remote item listings into stored items.
///
/// Additions, changes and removals are committed in that order of safety:
/// deletes first, then inserts, then updates. Items re-listed under a new
/// url but with a number that was just removed inherit the removed item's
/// read/bookmark state and fetch date.
pub struct ReconciliationEngine<I: LibraryItem> {
    repo: Arc<dyn ContentRepository<I>>,
    downloads: Arc<dyn DownloadIndex>,
    recognizer: Arc<dyn NumberRecognizer>,
    clock: Arc<dyn Clock>,
    estimator: FetchIntervalEstimator,
    mark_duplicate_read_as_read: bool,
}

impl<I: LibraryItem> ReconciliationEngine<I> {
    pub fn new(
        repo: Arc<dyn ContentRepository<I>>,
        downloads: Arc<dyn DownloadIndex>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            downloads,
            recognizer: Arc::new(PatternRecognizer),
            clock,
            estimator: FetchIntervalEstimator,
            mark_duplicate_read_as_read: false,
        }
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn NumberRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    /// Insert additions that repeat an already-read number as read.
    pub fn mark_duplicate_read_as_read(mut self, enabled: bool) -> Self {
        self.mark_duplicate_read_as_read = enabled;
        self
    }

    pub fn estimator(&self) -> &FetchIntervalEstimator {
        &self.estimator
    }

    /// Merge `raw` (newest first, as listed by `source`) into `entry`.
    ///
    /// # Errors
    ///
    /// - [`SyncError::EmptyRemoteListing`] for an empty listing from a
    ///   non-local source; nothing is touched in that case
    /// - [`SyncError::Repository`] when stored items cannot be read
    ///
    /// Write failures are logged and reflected in
    /// [`ReconcileOutcome::committed`].
    pub async fn reconcile(
        &self,
        raw: Vec<RemoteItem>,
        entry: &Entry,
        source: &dyn SourceClient,
        manual_fetch: bool,
        window: Option<FetchWindow>,
    ) -> Result<ReconcileOutcome<I>, SyncError> {
        if raw.is_empty() && !source.is_local() {
            return Err(SyncError::EmptyRemoteListing);
        }

        let now = self.clock.now();
        let now_ms = now.timestamp_millis();
        let window = window.unwrap_or_else(|| self.estimator.window(now));

        let existing = self.repo.items_for_entry(entry.id).await?;
        let excluded = self.repo.excluded_scanlators(entry.id).await?;
        let listing = self.normalize(raw, entry, source);

        let mut stored_by_url: HashMap<&str, &I> = existing
            .iter()
            .map(|item| (item.core().url.as_str(), item))
            .collect();
        let mut additions: Vec<I> = Vec::new();
        let mut changes: Vec<I> = Vec::new();
        let mut latest_upload = 0;

        for listed in listing {
            match stored_by_url.remove(listed.core().url.as_str()) {
                None => {
                    let mut added = listed;
                    let core = added.core_mut();
                    if core.date_upload == 0 {
                        core.date_upload = if latest_upload == 0 {
                            now_ms
                        } else {
                            latest_upload
                        };
                    } else {
                        latest_upload = latest_upload.max(core.date_upload);
                    }
                    additions.push(added);
                }
                Some(stored) if stored.metadata_differs(&listed) => {
                    let mut updated = stored.clone();
                    updated.apply_remote_metadata(&listed);
                    self.rename_download(entry, stored, &updated).await;
                    changes.push(updated);
                }
                Some(_) => {}
            }
        }
        let removals: Vec<I> = stored_by_url.into_values().cloned().collect();

        if additions.is_empty() && removals.is_empty() && changes.is_empty() {
            if manual_fetch || entry.fetch_interval == 0 || entry.next_update < window.start {
                self.refresh_schedule(entry, &existing, now, window).await;
            }
            tracing::debug!(entry_id = entry.id, "Item listing unchanged");
            return Ok(ReconcileOutcome::unchanged());
        }

        let removed = Removed::collect(&removals);
        let read_numbers: HashSet<u64> = if self.mark_duplicate_read_as_read {
            existing
                .iter()
                .filter(|item| item.core().read)
                .filter_map(|item| item.core().number.key())
                .collect()
        } else {
            HashSet::new()
        };

        let mut hidden: HashSet<String> = HashSet::new();
        let mut remaining = additions.len() as i64;
        for item in &mut additions {
            let core = item.core_mut();
            core.date_fetch = now_ms + remaining;
            remaining -= 1;

            let Some(key) = core.number.key() else {
                continue;
            };
            if let Some(&fetched) = removed.latest_fetch.get(&key) {
                core.read = removed.read.contains(&key);
                core.bookmark = removed.bookmarked.contains(&key);
                core.date_fetch = fetched;
                hidden.insert(core.url.clone());
            } else if read_numbers.contains(&key) {
                core.read = true;
                hidden.insert(core.url.clone());
            }
        }

        let mut committed = true;
        if !removals.is_empty() {
            let ids: Vec<ItemId> = removals.iter().map(|item| item.core().id).collect();
            if let Err(e) = self.repo.delete_items(&ids).await {
                tracing::error!(entry_id = entry.id, error = %e, "Failed to delete removed items");
                committed = false;
            }
        }
        let inserted = if additions.is_empty() {
            Vec::new()
        } else {
            match self.repo.insert_items(&additions).await {
                Ok(inserted) => inserted,
                Err(e) => {
                    tracing::error!(entry_id = entry.id, error = %e, "Failed to insert new items");
                    committed = false;
                    Vec::new()
                }
            }
        };
        if !changes.is_empty() {
            if let Err(e) = self.repo.update_items(&changes).await {
                tracing::error!(entry_id = entry.id, error = %e, "Failed to update changed items");
                committed = false;
            }
        }

        let mut touched = entry.clone();
        touched.last_update = now_ms;
        if let Err(e) = self.repo.set_last_update(entry.id, now_ms).await {
            tracing::error!(entry_id = entry.id, error = %e, "Failed to stamp last update");
            committed = false;
        }
        match self.repo.items_for_entry(entry.id).await {
            Ok(history) => self.refresh_schedule(&touched, &history, now, window).await,
            Err(e) => {
                tracing::warn!(entry_id = entry.id, error = %e, "Skipping schedule refresh");
            }
        }

        let outcome = ReconcileOutcome {
            added: inserted.len(),
            removed: removals.len(),
            changed: changes.len(),
            new_items: inserted
                .into_iter()
                .filter(|item| !hidden.contains(&item.core().url))
                .filter(|item| {
                    item.core()
                        .scanlator
                        .as_ref()
                        .is_none_or(|group| !excluded.contains(group))
                })
                .collect(),
            committed,
        };
        tracing::info!(
            entry_id = entry.id,
            added = outcome.added,
            removed = outcome.removed,
            changed = outcome.changed,
            new = outcome.new_items.len(),
            "Reconciled item listing"
        );
        Ok(outcome)
    }

    /// Dedupe by url, clean names, let the source fill in gaps, recognize
    /// numbers.
    fn normalize(&self, raw: Vec<RemoteItem>, entry: &Entry, source: &dyn SourceClient) -> Vec<I> {
        let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
        raw.into_iter()
            .filter(|remote| seen.insert(remote.url.clone()))
            .enumerate()
            .map(|(order, mut remote)| {
                remote.name = sanitize_item_name(&remote.name, &entry.title).into_owned();
                source.prepare_new_item(&mut remote, entry);
                let hint = ItemNumber::from_hint(remote.number);
                let number = self.recognizer.recognize(&entry.title, &remote.name, hint);
                I::from_core(ItemCore::from_remote(entry.id, remote, order as i64, number))
            })
            .collect()
    }

    async fn rename_download(&self, entry: &Entry, stored: &I, updated: &I) {
        let (old_key, new_key) = (stored.download_key(), updated.download_key());
        if old_key == new_key || !self.downloads.is_downloaded(entry, &old_key).await {
            return;
        }
        if let Err(e) = self.downloads.rename(entry, &old_key, &new_key).await {
            tracing::warn!(
                entry_id = entry.id,
                old = %old_key,
                new = %new_key,
                error = %e,
                "Failed to rename downloaded item"
            );
        }
    }

    async fn refresh_schedule(
        &self,
        entry: &Entry,
        history: &[I],
        now: DateTime<FixedOffset>,
        window: FetchWindow,
    ) {
        let Some(schedule) = self.estimator.schedule(entry, history, now, window) else {
            return;
        };
        tracing::debug!(
            entry_id = entry.id,
            interval = schedule.interval,
            next_update = schedule.next_update,
            "Fetch schedule updated"
        );
        if let Err(e) = self.repo.update_fetch_schedule(entry.id, schedule).await {
            tracing::error!(entry_id = entry.id, error = %e, "Failed to store fetch schedule");
        }
    }
}
