use anyhow::{anyhow, Result};
use thiserror::Error;

use crate::media::{
    Entry, EntryId, EntryStatus, ItemCore, ItemNumber, LibraryItem, ResumePosition,
    UpdateStrategy,
};

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The library database is in use by another process. Close it and try again.")]
    InstanceLocked,

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classify lock-related SQLite failures (SQLITE_BUSY, SQLITE_LOCKED,
    /// SQLITE_CANTOPEN) as [`DatabaseError::InstanceLocked`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let message = err.to_string().to_lowercase();
        if message.contains("database is locked")
            || message.contains("database table is locked")
            || message.contains("sqlite_busy")
            || message.contains("sqlite_locked")
            || message.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

// ============================================================================
// Row Types
// ============================================================================

/// Column list matching [`EntryRow`]
pub(crate) const ENTRY_COLUMNS: &str = "id, kind, source, url, title, author, description, \
     genre, thumbnail_url, favorite, status, update_strategy, fetch_interval, last_update, \
     next_update, date_added";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryRow {
    pub id: i64,
    pub kind: String,
    pub source: i64,
    pub url: String,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub thumbnail_url: Option<String>,
    pub favorite: bool,
    pub status: i64,
    pub update_strategy: i64,
    pub fetch_interval: i32,
    pub last_update: i64,
    pub next_update: i64,
    pub date_added: i64,
}

impl EntryRow {
    pub(crate) fn into_entry(self) -> Result<Entry> {
        let kind = self
            .kind
            .parse()
            .map_err(|e: String| anyhow!("entry {}: {}", self.id, e))?;
        Ok(Entry {
            id: self.id,
            kind,
            source: self.source,
            url: self.url,
            title: self.title,
            author: self.author,
            description: self.description,
            genre: self.genre,
            thumbnail_url: self.thumbnail_url,
            favorite: self.favorite,
            status: EntryStatus::from_code(self.status),
            update_strategy: UpdateStrategy::from_code(self.update_strategy),
            fetch_interval: self.fetch_interval,
            last_update: self.last_update,
            next_update: self.next_update,
            date_added: self.date_added,
        })
    }
}

/// [`EntryRow`] plus item counters for the library view.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LibraryRow {
    #[sqlx(flatten)]
    pub entry: EntryRow,
    pub total_items: i64,
    pub read_items: i64,
}

pub(crate) const ITEM_COLUMNS: &str = "id, entry_id, url, name, scanlator, number, source_order, \
     date_fetch, date_upload, read, bookmark, resume_position, resume_total";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub id: i64,
    pub entry_id: EntryId,
    pub url: String,
    pub name: String,
    pub scanlator: Option<String>,
    pub number: Option<f64>,
    pub source_order: i64,
    pub date_fetch: i64,
    pub date_upload: i64,
    pub read: bool,
    pub bookmark: bool,
    pub resume_position: i64,
    pub resume_total: i64,
}

impl ItemRow {
    pub(crate) fn into_item<I: LibraryItem>(self) -> I {
        let core = ItemCore {
            id: self.id,
            entry_id: self.entry_id,
            url: self.url,
            name: self.name,
            scanlator: self.scanlator,
            number: self
                .number
                .map_or(ItemNumber::Unrecognized, ItemNumber::Recognized),
            source_order: self.source_order,
            date_fetch: self.date_fetch,
            date_upload: self.date_upload,
            read: self.read,
            bookmark: self.bookmark,
        };
        I::from_parts(
            core,
            ResumePosition {
                position: self.resume_position,
                total: self.resume_total,
            },
        )
    }
}

/// A download waiting in the persisted queue.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct QueuedDownload {
    pub entry_id: EntryId,
    pub item_id: i64,
    pub key: String,
    pub name: String,
}

/// A user-defined category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub sort_order: i64,
}
