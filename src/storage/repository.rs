use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

use super::schema::Database;
use crate::media::{CategoryId, Entry, EntryDetails, EntryId, ItemId, LibraryEntry, LibraryItem};
use crate::sync::{ContentRepository, FetchSchedule};

#[async_trait]
impl<I: LibraryItem> ContentRepository<I> for Database {
    async fn entry(&self, id: EntryId) -> Result<Option<Entry>> {
        self.get_entry(id).await
    }

    async fn library(&self) -> Result<Vec<LibraryEntry>> {
        self.library_entries(I::KIND).await
    }

    async fn entry_categories(&self, id: EntryId) -> Result<Vec<CategoryId>> {
        Database::entry_categories(self, id).await
    }

    async fn items_for_entry(&self, id: EntryId) -> Result<Vec<I>> {
        Database::items_for_entry(self, id).await
    }

    async fn insert_items(&self, items: &[I]) -> Result<Vec<I>> {
        Database::insert_items(self, items).await
    }

    async fn update_items(&self, items: &[I]) -> Result<()> {
        Database::update_items(self, items).await
    }

    async fn delete_items(&self, ids: &[ItemId]) -> Result<()> {
        Database::delete_items(self, ids).await
    }

    async fn update_fetch_schedule(&self, id: EntryId, schedule: FetchSchedule) -> Result<()> {
        Database::update_fetch_schedule(self, id, schedule).await
    }

    async fn set_last_update(&self, id: EntryId, at: i64) -> Result<()> {
        Database::set_last_update(self, id, at).await
    }

    async fn apply_details(&self, id: EntryId, details: &EntryDetails) -> Result<()> {
        Database::apply_details(self, id, details).await
    }

    async fn excluded_scanlators(&self, id: EntryId) -> Result<HashSet<String>> {
        Database::excluded_scanlators(self, id).await
    }
}
