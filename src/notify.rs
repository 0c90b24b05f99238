//! User-facing refresh notifications.

use std::path::Path;

use crate::media::{Entry, MediaKind};
use crate::sync::SkippedEntry;

/// New items found for one entry.
#[derive(Debug, Clone)]
pub struct NewItemsNotice {
    pub entry: Entry,
    /// Item names, newest first
    pub item_names: Vec<String>,
}

pub trait NotificationSink: Send + Sync {
    /// Titles currently being refreshed and overall progress.
    fn progress(&self, in_flight: &[String], completed: usize, total: usize);

    fn queue_size_warning(&self, source: &str, entries: usize);

    fn new_items(&self, kind: MediaKind, notices: &[NewItemsNotice]);

    fn skipped(&self, kind: MediaKind, skipped: &[SkippedEntry]);

    /// `report` is the failure report written for this run, if any.
    fn failed(&self, kind: MediaKind, count: usize, report: Option<&Path>);
}

/// Sink that renders notifications as log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn progress(&self, in_flight: &[String], completed: usize, total: usize) {
        tracing::debug!(
            completed,
            total,
            in_flight = %in_flight.join(", "),
            "Refresh progress"
        );
    }

    fn queue_size_warning(&self, source: &str, entries: usize) {
        tracing::warn!(
            source = %source,
            entries,
            "Many entries from one source; refreshing may be slow or rate limited"
        );
    }

    fn new_items(&self, kind: MediaKind, notices: &[NewItemsNotice]) {
        if notices.is_empty() {
            return;
        }
        let total: usize = notices.iter().map(|n| n.item_names.len()).sum();
        tracing::info!(kind = %kind, entries = notices.len(), items = total, "New items found");
        for notice in notices {
            tracing::info!(
                title = %notice.entry.title,
                items = %notice.item_names.join(", "),
                "New items"
            );
        }
    }

    fn skipped(&self, kind: MediaKind, skipped: &[SkippedEntry]) {
        if skipped.is_empty() {
            return;
        }
        let mut reasons: Vec<String> = skipped.iter().map(|s| s.reason.to_string()).collect();
        reasons.sort();
        reasons.dedup();
        tracing::info!(
            kind = %kind,
            count = skipped.len(),
            reasons = %reasons.join("; "),
            "Entries skipped"
        );
    }

    fn failed(&self, kind: MediaKind, count: usize, report: Option<&Path>) {
        if count == 0 {
            return;
        }
        match report {
            Some(path) => {
                tracing::warn!(kind = %kind, count, report = %path.display(), "Entries failed to refresh")
            }
            None => tracing::warn!(kind = %kind, count, "Entries failed to refresh"),
        }
    }
}
