use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

use super::interval::FetchSchedule;
use crate::media::{CategoryId, Entry, EntryDetails, EntryId, ItemId, LibraryEntry, LibraryItem};

/// Persistence the sync engine reads from and commits to, one item type at a
/// time.
#[async_trait]
pub trait ContentRepository<I: LibraryItem>: Send + Sync {
    async fn entry(&self, id: EntryId) -> Result<Option<Entry>>;

    /// Favorited entries of `I::KIND` with categories and read counts.
    async fn library(&self) -> Result<Vec<LibraryEntry>>;

    async fn entry_categories(&self, id: EntryId) -> Result<Vec<CategoryId>>;

    async fn items_for_entry(&self, id: EntryId) -> Result<Vec<I>>;

    /// Insert all items in one transaction; returns them with ids assigned.
    async fn insert_items(&self, items: &[I]) -> Result<Vec<I>>;

    async fn update_items(&self, items: &[I]) -> Result<()>;

    async fn delete_items(&self, ids: &[ItemId]) -> Result<()>;

    async fn update_fetch_schedule(&self, id: EntryId, schedule: FetchSchedule) -> Result<()>;

    async fn set_last_update(&self, id: EntryId, at: i64) -> Result<()>;

    /// Overwrite descriptive fields present in `details`.
    async fn apply_details(&self, id: EntryId, details: &EntryDetails) -> Result<()>;

    async fn excluded_scanlators(&self, id: EntryId) -> Result<HashSet<String>>;
}
