use std::collections::HashSet;
use std::fmt;

use super::interval::FetchWindow;
use super::options::LibraryPreferences;
use crate::media::{CategoryId, Entry, EntryStatus, LibraryEntry, UpdateStrategy};

/// Why an entry was left out of a refresh run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    NotAlwaysUpdate,
    Completed,
    CaughtUp,
    HasUnread,
    NotStarted,
    OutsideReleasePeriod,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NotAlwaysUpdate => "Set to fetch only once",
            SkipReason::Completed => "Completed",
            SkipReason::CaughtUp => "No unread items left",
            SkipReason::HasUnread => "Has unread items",
            SkipReason::NotStarted => "Not started",
            SkipReason::OutsideReleasePeriod => "No release expected yet",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub struct SkippedEntry {
    pub entry: Entry,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Entries to refresh, ordered by title
    pub eligible: Vec<LibraryEntry>,
    pub skipped: Vec<SkippedEntry>,
}

/// Pick the entries a refresh run should cover.
///
/// With `category` set only that category is considered; otherwise the
/// configured include categories (or the whole library) minus the exclude
/// categories.
pub fn select_entries(
    library: Vec<LibraryEntry>,
    category: Option<CategoryId>,
    prefs: &LibraryPreferences,
    window: FetchWindow,
) -> Selection {
    let mut seen = HashSet::new();
    let candidates = library
        .into_iter()
        .filter(|e| match category {
            Some(category) => e.categories.contains(&category),
            None => {
                (prefs.include_categories.is_empty() || e.in_any(&prefs.include_categories))
                    && !e.in_any(&prefs.exclude_categories)
            }
        })
        .filter(|e| seen.insert(e.entry.id));

    let mut selection = Selection::default();
    for candidate in candidates {
        match skip_reason(&candidate, prefs, window) {
            Some(reason) => selection.skipped.push(SkippedEntry {
                entry: candidate.entry,
                reason,
            }),
            None => selection.eligible.push(candidate),
        }
    }
    selection
        .eligible
        .sort_by_cached_key(|e| e.entry.title.to_lowercase());
    selection
}

fn skip_reason(
    candidate: &LibraryEntry,
    prefs: &LibraryPreferences,
    window: FetchWindow,
) -> Option<SkipReason> {
    let rules = &prefs.restrictions;
    let entry = &candidate.entry;

    if entry.update_strategy != UpdateStrategy::AlwaysUpdate {
        Some(SkipReason::NotAlwaysUpdate)
    } else if rules.skip_completed && entry.status == EntryStatus::Completed {
        Some(SkipReason::Completed)
    } else if rules.skip_caught_up && candidate.unread_items() == 0 {
        Some(SkipReason::CaughtUp)
    } else if rules.skip_has_unread && candidate.unread_items() > 0 {
        Some(SkipReason::HasUnread)
    } else if rules.skip_unstarted && candidate.total_items > 0 && !candidate.has_started() {
        Some(SkipReason::NotStarted)
    } else if rules.skip_outside_release_period && entry.next_update >= window.end {
        Some(SkipReason::OutsideReleasePeriod)
    } else {
        None
    }
}
