//! Preference manager that merges config.toml defaults with DB overrides.
//!
//! Config values serve as defaults; rows in the `user_preferences` table
//! override them. Writes always go to the DB, never to the config file.
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;

use crate::config::Config;
use crate::media::CategoryId;
use crate::scheduler::JobConstraints;
use crate::storage::Database;
use crate::sync::{DownloadPolicy, LibraryPreferences, UpdateRestrictions};

// ============================================================================
// PreferenceManager
// ============================================================================

/// Merged preference store: config.toml defaults + DB overrides.
///
/// Config values are flattened into dotted keys (`library.skip_completed`,
/// `download.categories`, ...) and stored overrides are layered on top.
/// Category lists are comma separated.
pub struct PreferenceManager {
    prefs: HashMap<String, String>,
}

impl PreferenceManager {
    pub async fn load(config: &Config, db: &Database) -> Result<Self> {
        let mut prefs = Self::flatten_config(config);
        for (key, value) in db.all_preferences().await? {
            prefs.insert(key, value);
        }
        Ok(Self { prefs })
    }

    /// Config only, for when the DB cannot be read.
    pub fn from_config(config: &Config) -> Self {
        Self {
            prefs: Self::flatten_config(config),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.prefs.get(key).map(String::as_str)
    }

    /// Persist an override and apply it in memory.
    pub async fn set(&mut self, db: &Database, key: &str, value: &str) -> Result<()> {
        db.set_preference(key, value).await?;
        self.prefs.insert(key.to_string(), value.to_string());
        Ok(())
    }

    // ========================================================================
    // Type-safe Accessors
    // ========================================================================

    pub fn library_preferences(&self) -> LibraryPreferences {
        let defaults = LibraryPreferences::default();
        let restrictions = defaults.restrictions;
        LibraryPreferences {
            restrictions: UpdateRestrictions {
                skip_completed: self.parsed("library.skip_completed", restrictions.skip_completed),
                skip_caught_up: self.parsed("library.skip_caught_up", restrictions.skip_caught_up),
                skip_has_unread: self
                    .parsed("library.skip_has_unread", restrictions.skip_has_unread),
                skip_unstarted: self.parsed("library.skip_unstarted", restrictions.skip_unstarted),
                skip_outside_release_period: self.parsed(
                    "library.skip_outside_release_period",
                    restrictions.skip_outside_release_period,
                ),
            },
            auto_update_metadata: self
                .parsed("library.auto_update_metadata", defaults.auto_update_metadata),
            include_categories: self.categories("library.include_categories"),
            exclude_categories: self.categories("library.exclude_categories"),
            mark_duplicate_read_as_read: self.parsed(
                "library.mark_duplicate_read_as_read",
                defaults.mark_duplicate_read_as_read,
            ),
            downloads: DownloadPolicy {
                download_new: self.parsed("download.download_new", false),
                categories: self.categories("download.categories"),
                exclude_categories: self.categories("download.exclude_categories"),
            },
            max_concurrent_sources: self
                .parsed("library.max_concurrent_sources", defaults.max_concurrent_sources)
                .max(1),
            queue_warning_threshold: self.parsed(
                "library.queue_warning_threshold",
                defaults.queue_warning_threshold,
            ),
        }
    }

    pub fn job_constraints(&self) -> JobConstraints {
        JobConstraints {
            require_unmetered: self.parsed("constraints.require_unmetered", false),
            require_charging: self.parsed("constraints.require_charging", false),
            require_battery_not_low: self.parsed("constraints.require_battery_not_low", false),
        }
    }

    /// Periodic refresh interval; `None` means manual refresh only.
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.parsed::<u64>("refresh_interval_hours", 0) {
            0 => None,
            hours => Some(Duration::from_secs(hours * 3600)),
        }
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = raw, "Ignoring unparsable preference");
                default
            }),
            None => default,
        }
    }

    fn categories(&self, key: &str) -> Vec<CategoryId> {
        let Some(raw) = self.get(key) else {
            return Vec::new();
        };
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match s.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!(key, value = s, "Ignoring invalid category id");
                    None
                }
            })
            .collect()
    }

    fn flatten_config(config: &Config) -> HashMap<String, String> {
        let join = |ids: &[CategoryId]| {
            ids.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        let library = &config.library;
        let download = &config.download;
        let constraints = &config.constraints;

        [
            ("refresh_interval_hours", config.refresh_interval_hours.to_string()),
            ("library.skip_completed", library.skip_completed.to_string()),
            ("library.skip_caught_up", library.skip_caught_up.to_string()),
            ("library.skip_has_unread", library.skip_has_unread.to_string()),
            ("library.skip_unstarted", library.skip_unstarted.to_string()),
            (
                "library.skip_outside_release_period",
                library.skip_outside_release_period.to_string(),
            ),
            ("library.auto_update_metadata", library.auto_update_metadata.to_string()),
            ("library.include_categories", join(&library.include_categories)),
            ("library.exclude_categories", join(&library.exclude_categories)),
            (
                "library.mark_duplicate_read_as_read",
                library.mark_duplicate_read_as_read.to_string(),
            ),
            ("library.max_concurrent_sources", library.max_concurrent_sources.to_string()),
            ("library.queue_warning_threshold", library.queue_warning_threshold.to_string()),
            ("download.download_new", download.download_new.to_string()),
            ("download.categories", join(&download.categories)),
            ("download.exclude_categories", join(&download.exclude_categories)),
            ("constraints.require_unmetered", constraints.require_unmetered.to_string()),
            ("constraints.require_charging", constraints.require_charging.to_string()),
            (
                "constraints.require_battery_not_low",
                constraints.require_battery_not_low.to_string(),
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
