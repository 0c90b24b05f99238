use serde::Deserialize;

use crate::media::CategoryId;

/// Skip rules applied during selection, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UpdateRestrictions {
    pub skip_completed: bool,
    /// Skip entries with nothing left unread
    pub skip_caught_up: bool,
    /// Skip entries that still have unread items
    pub skip_has_unread: bool,
    pub skip_unstarted: bool,
    pub skip_outside_release_period: bool,
}

impl Default for UpdateRestrictions {
    fn default() -> Self {
        Self {
            skip_completed: true,
            skip_caught_up: false,
            skip_has_unread: false,
            skip_unstarted: false,
            skip_outside_release_period: true,
        }
    }
}

/// Which entries get their new items queued for download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DownloadPolicy {
    pub download_new: bool,
    /// Empty means every category
    pub categories: Vec<CategoryId>,
    pub exclude_categories: Vec<CategoryId>,
}

impl DownloadPolicy {
    /// Exclusion wins over inclusion.
    pub fn should_download(&self, entry_categories: &[CategoryId]) -> bool {
        if !self.download_new {
            return false;
        }
        if entry_categories
            .iter()
            .any(|c| self.exclude_categories.contains(c))
        {
            return false;
        }
        self.categories.is_empty()
            || entry_categories
                .iter()
                .any(|c| self.categories.contains(c))
    }
}

/// Library refresh settings resolved from config and stored preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPreferences {
    pub restrictions: UpdateRestrictions,
    pub auto_update_metadata: bool,
    pub include_categories: Vec<CategoryId>,
    pub exclude_categories: Vec<CategoryId>,
    pub mark_duplicate_read_as_read: bool,
    pub downloads: DownloadPolicy,
    /// Sources refreshed at the same time
    pub max_concurrent_sources: usize,
    /// Entries from one metered source above which the user is warned
    pub queue_warning_threshold: usize,
}

impl LibraryPreferences {
    pub const DEFAULT_MAX_CONCURRENT_SOURCES: usize = 5;
    pub const DEFAULT_QUEUE_WARNING_THRESHOLD: usize = 60;
}

impl Default for LibraryPreferences {
    fn default() -> Self {
        Self {
            restrictions: UpdateRestrictions::default(),
            auto_update_metadata: false,
            include_categories: Vec::new(),
            exclude_categories: Vec::new(),
            mark_duplicate_read_as_read: false,
            downloads: DownloadPolicy::default(),
            max_concurrent_sources: Self::DEFAULT_MAX_CONCURRENT_SOURCES,
            queue_warning_threshold: Self::DEFAULT_QUEUE_WARNING_THRESHOLD,
        }
    }
}
