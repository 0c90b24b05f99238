//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shelfsync::clock::FixedClock;
use shelfsync::download::{DownloadIndex, DownloadRequest};
use shelfsync::media::{Entry, MediaKind, NewEntry, RemoteItem, SourceId};
use shelfsync::source::{SourceClient, SourceError};
use shelfsync::storage::Database;

/// 2024-03-15T12:00:00Z
pub const NOON: i64 = 1_710_504_000_000;

pub async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::at_millis(NOON))
}

pub async fn manga(db: &Database, source: SourceId, url: &str, title: &str) -> Entry {
    db.insert_entry(NewEntry::favorite(MediaKind::Manga, source, url, title), NOON)
        .await
        .unwrap()
}

pub fn chapter(url: &str, name: &str) -> RemoteItem {
    RemoteItem::new(url, name)
}

// ============================================================================
// Sources
// ============================================================================

enum Script {
    Items(Vec<RemoteItem>),
    Fail(String),
}

/// Source whose listing the test controls. Tracks how many listings are in
/// flight at once across every source sharing the same counters.
pub struct ScriptedSource {
    id: SourceId,
    name: String,
    local: bool,
    script: Mutex<Script>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(id: SourceId, items: Vec<RemoteItem>) -> Self {
        Self {
            id,
            name: format!("Scripted {id}"),
            local: false,
            script: Mutex::new(Script::Items(items)),
            delay: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn failing(id: SourceId, message: &str) -> Self {
        let source = Self::new(id, Vec::new());
        source.fail_with(message);
        source
    }

    pub fn slow(mut self, delay: Duration, in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Self {
        self.delay = Some(delay);
        self.in_flight = in_flight;
        self.peak = peak;
        self
    }

    pub fn set_items(&self, items: Vec<RemoteItem>) {
        *self.script.lock().unwrap() = Script::Items(items);
    }

    pub fn fail_with(&self, message: &str) {
        *self.script.lock().unwrap() = Script::Fail(message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceClient for ScriptedSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        self.local
    }

    async fn item_list(&self, _entry: &Entry) -> Result<Vec<RemoteItem>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &*self.script.lock().unwrap() {
            Script::Items(items) => Ok(items.clone()),
            Script::Fail(message) => Err(SourceError::Io(message.clone())),
        }
    }
}

// ============================================================================
// Downloads
// ============================================================================

#[derive(Default)]
pub struct RecordingDownloads {
    pub downloaded: Mutex<HashSet<String>>,
    pub renames: Mutex<Vec<(String, String)>>,
    pub queued: Mutex<Vec<DownloadRequest>>,
    pub starts: AtomicUsize,
}

impl RecordingDownloads {
    pub fn with_downloaded(keys: &[&str]) -> Self {
        let index = Self::default();
        index
            .downloaded
            .lock()
            .unwrap()
            .extend(keys.iter().map(|k| k.to_string()));
        index
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DownloadIndex for RecordingDownloads {
    async fn is_downloaded(&self, _entry: &Entry, key: &str) -> bool {
        self.downloaded.lock().unwrap().contains(key)
    }

    async fn rename(&self, _entry: &Entry, old_key: &str, new_key: &str) -> Result<()> {
        let mut downloaded = self.downloaded.lock().unwrap();
        downloaded.remove(old_key);
        downloaded.insert(new_key.to_string());
        self.renames
            .lock()
            .unwrap()
            .push((old_key.to_string(), new_key.to_string()));
        Ok(())
    }

    async fn enqueue(&self, _entry: &Entry, requests: Vec<DownloadRequest>) -> Result<()> {
        self.queued.lock().unwrap().extend(requests);
        Ok(())
    }

    async fn start_queue(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }
}
