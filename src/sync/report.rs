//! Failure report written at the end of a refresh run.
//!
//! ```text
//! ! Source not installed
//!   # Source 12 (not installed)
//!     - Some Title
//! ```

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::media::{Entry, MediaKind, SourceId};

/// An entry whose refresh failed, with the message shown to the user.
#[derive(Debug, Clone)]
pub struct FailedEntry {
    pub entry: Entry,
    pub message: String,
}

/// Group failures by message, then by source name.
pub fn render_error_report(
    failures: &[FailedEntry],
    source_name: impl Fn(SourceId) -> String,
) -> String {
    let mut grouped: BTreeMap<&str, BTreeMap<String, Vec<&str>>> = BTreeMap::new();
    for failure in failures {
        grouped
            .entry(failure.message.as_str())
            .or_default()
            .entry(source_name(failure.entry.source))
            .or_default()
            .push(failure.entry.title.as_str());
    }

    let mut out = String::new();
    for (message, sources) in grouped {
        let _ = writeln!(out, "! {message}");
        for (source, titles) in sources {
            let _ = writeln!(out, "  # {source}");
            for title in titles {
                let _ = writeln!(out, "    - {title}");
            }
        }
    }
    out
}

/// Write the report to `<dir>/<kind>_update_errors.txt`, replacing any
/// previous one.
pub async fn write_error_report(
    dir: &Path,
    kind: MediaKind,
    failures: &[FailedEntry],
    source_name: impl Fn(SourceId) -> String,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create report directory {}", dir.display()))?;
    let path = dir.join(format!("{}_update_errors.txt", kind.as_str()));
    tokio::fs::write(&path, render_error_report(failures, source_name))
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::NewEntry;
    use pretty_assertions::assert_eq;

    fn failed(source: SourceId, title: &str, message: &str) -> FailedEntry {
        FailedEntry {
            entry: NewEntry::favorite(MediaKind::Anime, source, "/a", title).into_entry(1, 0),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_grouped_by_message_then_source() {
        let failures = vec![
            failed(2, "Beta", "timeout"),
            failed(1, "Alpha", "timeout"),
            failed(2, "Gamma", "No episodes found"),
            failed(2, "Delta", "timeout"),
        ];
        let report = render_error_report(&failures, |id| format!("Src{id}"));
        assert_eq!(
            report,
            "! No episodes found\n  # Src2\n    - Gamma\n\
             ! timeout\n  # Src1\n    - Alpha\n  # Src2\n    - Beta\n    - Delta\n"
        );
    }

    #[tokio::test]
    async fn test_written_per_kind() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_error_report(
            &tmp.path().join("reports"),
            MediaKind::Anime,
            &[failed(1, "Alpha", "boom")],
            |_| "Src".to_string(),
        )
        .await
        .unwrap();
        assert!(path.ends_with("reports/anime_update_errors.txt"));
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "! boom\n  # Src\n    - Alpha\n");
    }
}
