use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{SourceClient, SourceError};
use crate::media::{Entry, EntryDetails, RemoteItem, SourceId};
use crate::util::natural_cmp;

pub const LOCAL_SOURCE_ID: SourceId = 0;

const DETAILS_FILE: &str = "details.json";

/// Source backed by a directory tree: `<root>/<entry url>/<item>`.
///
/// Every visible child of an entry directory is one item. A `details.json`
/// next to the items describes the entry itself.
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, entry: &Entry) -> PathBuf {
        self.root.join(entry.url.trim_start_matches('/'))
    }
}

fn modified_millis(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .map(|time| DateTime::<Utc>::from(time).timestamp_millis())
        .unwrap_or(0)
}

fn item_name(path: &Path, is_dir: bool) -> Option<String> {
    let name = if is_dir {
        path.file_name()
    } else {
        path.file_stem()
    };
    name.map(|n| n.to_string_lossy().into_owned())
}

#[async_trait]
impl SourceClient for LocalSource {
    fn id(&self) -> SourceId {
        LOCAL_SOURCE_ID
    }

    fn name(&self) -> &str {
        "Local source"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn item_list(&self, entry: &Entry) -> Result<Vec<RemoteItem>, SourceError> {
        let dir = self.entry_dir(entry);
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %dir.display(), "Local entry directory missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut items = Vec::new();
        while let Some(child) = reader.next_entry().await? {
            let file_name = child.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') || file_name == DETAILS_FILE {
                continue;
            }
            let metadata = child.metadata().await?;
            let Some(name) = item_name(&child.path(), metadata.is_dir()) else {
                continue;
            };
            items.push(RemoteItem {
                url: format!("{}/{}", entry.url.trim_end_matches('/'), file_name),
                name,
                date_upload: modified_millis(&metadata),
                ..RemoteItem::default()
            });
        }

        items.sort_by(|a, b| natural_cmp(&b.name, &a.name));
        Ok(items)
    }

    async fn details(&self, entry: &Entry) -> Result<Option<EntryDetails>, SourceError> {
        let path = self.entry_dir(entry).join(DETAILS_FILE);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let details: EntryDetails =
            serde_json::from_str(&raw).map_err(|e| SourceError::Parse(e.to_string()))?;
        Ok(Some(details))
    }
}
