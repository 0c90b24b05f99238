//! Configuration file parser for ~/.config/shelfsync/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde, but a warning is logged for each one so
//! typos do not go unnoticed.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::media::CategoryId;
use crate::scheduler::JobConstraints;
use crate::sync::{DownloadPolicy, LibraryPreferences, UpdateRestrictions};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// Every field has a default, so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hours between periodic refreshes. 0 = manual refresh only.
    pub refresh_interval_hours: u64,

    pub library: LibraryConfig,

    pub download: DownloadPolicy,

    /// Conditions the periodic refresh waits for
    pub constraints: JobConstraints,

    pub paths: PathsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_hours: 12,
            library: LibraryConfig::default(),
            download: DownloadPolicy::default(),
            constraints: JobConstraints::default(),
            paths: PathsConfig::default(),
        }
    }
}

/// `[library]` table: which entries a refresh touches and how.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub skip_completed: bool,
    pub skip_caught_up: bool,
    pub skip_has_unread: bool,
    pub skip_unstarted: bool,
    pub skip_outside_release_period: bool,
    pub auto_update_metadata: bool,
    pub include_categories: Vec<CategoryId>,
    pub exclude_categories: Vec<CategoryId>,
    pub mark_duplicate_read_as_read: bool,
    pub max_concurrent_sources: usize,
    pub queue_warning_threshold: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let prefs = LibraryPreferences::default();
        let restrictions = prefs.restrictions;
        Self {
            skip_completed: restrictions.skip_completed,
            skip_caught_up: restrictions.skip_caught_up,
            skip_has_unread: restrictions.skip_has_unread,
            skip_unstarted: restrictions.skip_unstarted,
            skip_outside_release_period: restrictions.skip_outside_release_period,
            auto_update_metadata: prefs.auto_update_metadata,
            include_categories: prefs.include_categories,
            exclude_categories: prefs.exclude_categories,
            mark_duplicate_read_as_read: prefs.mark_duplicate_read_as_read,
            max_concurrent_sources: prefs.max_concurrent_sources,
            queue_warning_threshold: prefs.queue_warning_threshold,
        }
    }
}

impl LibraryConfig {
    pub fn restrictions(&self) -> UpdateRestrictions {
        UpdateRestrictions {
            skip_completed: self.skip_completed,
            skip_caught_up: self.skip_caught_up,
            skip_has_unread: self.skip_has_unread,
            skip_unstarted: self.skip_unstarted,
            skip_outside_release_period: self.skip_outside_release_period,
        }
    }
}

/// `[paths]` table. Unset paths resolve under the config directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub database: Option<PathBuf>,
    pub downloads: Option<PathBuf>,
    pub reports: Option<PathBuf>,
    pub local_source: Option<PathBuf>,
}

/// Fully resolved filesystem locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub database: PathBuf,
    pub downloads: PathBuf,
    pub reports: PathBuf,
    pub local_source: PathBuf,
}

impl PathsConfig {
    pub fn resolve(&self, config_dir: &Path) -> ResolvedPaths {
        let pick = |value: &Option<PathBuf>, fallback: &str| {
            value.clone().unwrap_or_else(|| config_dir.join(fallback))
        };
        ResolvedPaths {
            database: pick(&self.database, "library.db"),
            downloads: pick(&self.downloads, "downloads"),
            reports: pick(&self.reports, "reports"),
            local_source: pick(&self.local_source, "local"),
        }
    }
}

const TOP_LEVEL_KEYS: &[&str] = &[
    "refresh_interval_hours",
    "library",
    "download",
    "constraints",
    "paths",
];

const TABLE_KEYS: &[(&str, &[&str])] = &[
    (
        "library",
        &[
            "skip_completed",
            "skip_caught_up",
            "skip_has_unread",
            "skip_unstarted",
            "skip_outside_release_period",
            "auto_update_metadata",
            "include_categories",
            "exclude_categories",
            "mark_duplicate_read_as_read",
            "max_concurrent_sources",
            "queue_warning_threshold",
        ],
    ),
    ("download", &["download_new", "categories", "exclude_categories"]),
    (
        "constraints",
        &["require_unmetered", "require_charging", "require_battery_not_low"],
    ),
    ("paths", &["database", "downloads", "reports", "local_source"]),
];

/// Dotted names of keys the parser does not know about.
fn unknown_keys(raw: &toml::Table) -> Vec<String> {
    let mut unknown = Vec::new();
    for (key, value) in raw {
        if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
            unknown.push(key.clone());
            continue;
        }
        let Some(table) = value.as_table() else {
            continue;
        };
        let Some((_, known)) = TABLE_KEYS.iter().find(|(name, _)| name == key) else {
            continue;
        };
        unknown.extend(
            table
                .keys()
                .filter(|k| !known.contains(&k.as_str()))
                .map(|k| format!("{key}.{k}")),
        );
    }
    unknown
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in unknown_keys(&raw) {
                tracing::warn!(key = %key, "Unknown key in config file, ignoring");
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            refresh_interval_hours = config.refresh_interval_hours,
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.refresh_interval_hours, 12);
        assert!(config.library.skip_completed);
        assert!(config.library.skip_outside_release_period);
        assert!(!config.library.skip_unstarted);
        assert_eq!(config.library.max_concurrent_sources, 5);
        assert_eq!(config.library.queue_warning_threshold, 60);
        assert!(!config.download.download_new);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (_dir, path) = write_config("   \n  \n  ");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (_dir, path) = write_config("[library]\nskip_unstarted = true\n");
        let config = Config::load(&path).unwrap();
        assert!(config.library.skip_unstarted);
        assert!(config.library.skip_completed);
        assert_eq!(config.refresh_interval_hours, 12);
    }

    #[test]
    fn test_full_config() {
        let (_dir, path) = write_config(
            r#"
refresh_interval_hours = 6

[library]
skip_completed = false
skip_caught_up = true
auto_update_metadata = true
include_categories = [1, 2]
exclude_categories = [3]
mark_duplicate_read_as_read = true
max_concurrent_sources = 3
queue_warning_threshold = 10

[download]
download_new = true
categories = [2]

[constraints]
require_unmetered = true

[paths]
database = "/data/shelf.db"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.refresh_interval_hours, 6);
        assert!(!config.library.skip_completed);
        assert!(config.library.skip_caught_up);
        assert!(config.library.auto_update_metadata);
        assert_eq!(config.library.include_categories, vec![1, 2]);
        assert_eq!(config.library.exclude_categories, vec![3]);
        assert_eq!(config.library.max_concurrent_sources, 3);
        assert!(config.download.download_new);
        assert_eq!(config.download.categories, vec![2]);
        assert!(config.constraints.require_unmetered);
        assert!(!config.constraints.require_charging);
        assert_eq!(config.paths.database, Some(PathBuf::from("/data/shelf.db")));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (_dir, path) = write_config("this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (_dir, path) = write_config("[library]\nskip_completed = \"yes\"\n");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_unknown_keys_accepted_and_reported() {
        let content = r#"
refresh_interval_hours = 1
theme = "dark"

[library]
skip_complete = true

[paths]
database = "x.db"
"#;
        let (_dir, path) = write_config(content);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.refresh_interval_hours, 1);

        let raw: toml::Table = content.parse().unwrap();
        let mut unknown = unknown_keys(&raw);
        unknown.sort();
        assert_eq!(unknown, vec!["library.skip_complete", "theme"]);
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (_dir, path) = write_config(&"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_paths_resolve_under_config_dir() {
        let paths = PathsConfig {
            reports: Some(PathBuf::from("/var/reports")),
            ..PathsConfig::default()
        };
        let resolved = paths.resolve(Path::new("/home/u/.config/shelfsync"));
        assert_eq!(
            resolved.database,
            PathBuf::from("/home/u/.config/shelfsync/library.db")
        );
        assert_eq!(resolved.reports, PathBuf::from("/var/reports"));
        assert_eq!(
            resolved.local_source,
            PathBuf::from("/home/u/.config/shelfsync/local")
        );
    }
}
