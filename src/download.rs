//! Downloaded-item bookkeeping.
//!
//! Downloads live under `<root>/<kind>/<source>/<entry title>/<item key>`.
//! Queued requests are persisted so a downloader started later can pick
//! them up.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

use crate::media::{Entry, ItemId};
use crate::storage::Database;
use crate::util::sanitize_file_name;

/// One item to fetch for offline use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub item_id: ItemId,
    /// Directory name the item will be stored under
    pub key: String,
    pub name: String,
}

#[async_trait]
pub trait DownloadIndex: Send + Sync {
    async fn is_downloaded(&self, entry: &Entry, key: &str) -> bool;

    /// Move a downloaded item to its new key.
    async fn rename(&self, entry: &Entry, old_key: &str, new_key: &str) -> Result<()>;

    async fn enqueue(&self, entry: &Entry, requests: Vec<DownloadRequest>) -> Result<()>;

    /// Signal the downloader that queued work is waiting.
    async fn start_queue(&self);
}

/// Filesystem-backed index with a database-persisted queue.
pub struct DirectoryDownloadIndex {
    root: PathBuf,
    db: Database,
    started: Notify,
    start_signals: AtomicUsize,
}

impl DirectoryDownloadIndex {
    pub fn new(root: impl Into<PathBuf>, db: Database) -> Self {
        Self {
            root: root.into(),
            db,
            started: Notify::new(),
            start_signals: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every downloaded item of `entry`.
    pub fn entry_dir(&self, entry: &Entry) -> PathBuf {
        self.root
            .join(entry.kind.as_str())
            .join(entry.source.to_string())
            .join(sanitize_file_name(&entry.title).as_ref())
    }

    /// Resolves once [`DownloadIndex::start_queue`] has been called.
    pub async fn wait_for_start(&self) {
        self.started.notified().await;
    }

    pub fn start_signals(&self) -> usize {
        self.start_signals.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DownloadIndex for DirectoryDownloadIndex {
    async fn is_downloaded(&self, entry: &Entry, key: &str) -> bool {
        let path = self.entry_dir(entry).join(key);
        tokio::fs::try_exists(&path).await.unwrap_or(false)
    }

    async fn rename(&self, entry: &Entry, old_key: &str, new_key: &str) -> Result<()> {
        let dir = self.entry_dir(entry);
        let (from, to) = (dir.join(old_key), dir.join(new_key));
        tokio::fs::rename(&from, &to)
            .await
            .with_context(|| format!("Failed to rename {} to {}", from.display(), to.display()))?;
        tracing::debug!(entry_id = entry.id, old = %old_key, new = %new_key, "Renamed download");
        Ok(())
    }

    async fn enqueue(&self, entry: &Entry, requests: Vec<DownloadRequest>) -> Result<()> {
        let queued = self.db.enqueue_downloads(entry.id, &requests).await?;
        tracing::info!(entry_id = entry.id, queued, "Queued downloads");
        Ok(())
    }

    async fn start_queue(&self) {
        self.start_signals.fetch_add(1, Ordering::Relaxed);
        self.started.notify_one();
        tracing::info!(root = %self.root.display(), "Download queue started");
    }
}
