use anyhow::Result;
use std::collections::{HashMap, HashSet};

use super::schema::Database;
use super::types::{EntryRow, LibraryRow, ENTRY_COLUMNS};
use crate::media::{
    CategoryId, Entry, EntryDetails, EntryId, LibraryEntry, MediaKind, NewEntry, SourceId,
    DEFAULT_CATEGORY,
};
use crate::sync::FetchSchedule;

impl Database {
    // ========================================================================
    // Entry Operations
    // ========================================================================

    /// Add an entry to the library, returning it as stored.
    ///
    /// Re-adding a known `(kind, source, url)` marks it favorite again and
    /// keeps its history.
    pub async fn insert_entry(&self, new: NewEntry, date_added: i64) -> Result<Entry> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO entries (kind, source, url, title, favorite, status, update_strategy, date_added)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(kind, source, url) DO UPDATE SET
                favorite = excluded.favorite,
                title = excluded.title
            RETURNING id
        "#,
        )
        .bind(new.kind.as_str())
        .bind(new.source)
        .bind(&new.url)
        .bind(&new.title)
        .bind(new.favorite)
        .bind(new.status.code())
        .bind(new.update_strategy.code())
        .bind(date_added)
        .fetch_one(&self.pool)
        .await?;

        match self.get_entry(id).await? {
            Some(entry) => Ok(entry),
            None => Ok(new.into_entry(id, date_added)),
        }
    }

    pub async fn get_entry(&self, id: EntryId) -> Result<Option<Entry>> {
        let row: Option<EntryRow> =
            sqlx::query_as(&format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(EntryRow::into_entry).transpose()
    }

    pub async fn find_entry(
        &self,
        kind: MediaKind,
        source: SourceId,
        url: &str,
    ) -> Result<Option<Entry>> {
        let row: Option<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE kind = ? AND source = ? AND url = ?"
        ))
        .bind(kind.as_str())
        .bind(source)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        row.map(EntryRow::into_entry).transpose()
    }

    /// Remove from (or return to) the library without deleting history.
    pub async fn set_favorite(&self, id: EntryId, favorite: bool) -> Result<()> {
        sqlx::query("UPDATE entries SET favorite = ? WHERE id = ?")
            .bind(favorite)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Move an entry to another source, e.g. after migrating it.
    pub async fn set_entry_source(&self, id: EntryId, source: SourceId) -> Result<()> {
        sqlx::query("UPDATE entries SET source = ? WHERE id = ?")
            .bind(source)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Pin the fetch interval to `days` (stored negated), or hand it back to
    /// the estimator with `None`.
    pub async fn set_interval_override(&self, id: EntryId, days: Option<u16>) -> Result<()> {
        let interval = days.map_or(0, |d| -i32::from(d.max(1)));
        sqlx::query("UPDATE entries SET fetch_interval = ? WHERE id = ?")
            .bind(interval)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Favorited entries of `kind` with category memberships and counters.
    pub async fn library_entries(&self, kind: MediaKind) -> Result<Vec<LibraryEntry>> {
        let columns = ENTRY_COLUMNS
            .split(", ")
            .map(|c| format!("e.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let rows: Vec<LibraryRow> = sqlx::query_as(&format!(
            r#"
            SELECT {columns},
                   COUNT(i.id) AS total_items,
                   COALESCE(SUM(i.read), 0) AS read_items
            FROM entries e
            LEFT JOIN items i ON i.entry_id = e.id
            WHERE e.kind = ? AND e.favorite = 1
            GROUP BY e.id
            ORDER BY e.title
        "#
        ))
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        let memberships: Vec<(EntryId, CategoryId)> = sqlx::query_as(
            r#"
            SELECT ec.entry_id, ec.category_id
            FROM entry_categories ec
            JOIN entries e ON e.id = ec.entry_id
            WHERE e.kind = ? AND e.favorite = 1
        "#,
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        let mut categories: HashMap<EntryId, Vec<CategoryId>> = HashMap::new();
        for (entry_id, category_id) in memberships {
            categories.entry(entry_id).or_default().push(category_id);
        }

        rows.into_iter()
            .map(|row| {
                let entry = row.entry.into_entry()?;
                Ok(LibraryEntry {
                    categories: categories
                        .remove(&entry.id)
                        .unwrap_or_else(|| vec![DEFAULT_CATEGORY]),
                    entry,
                    total_items: row.total_items,
                    read_items: row.read_items,
                })
            })
            .collect()
    }

    pub async fn update_fetch_schedule(&self, id: EntryId, schedule: FetchSchedule) -> Result<()> {
        sqlx::query("UPDATE entries SET fetch_interval = ?, next_update = ? WHERE id = ?")
            .bind(schedule.interval)
            .bind(schedule.next_update)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_last_update(&self, id: EntryId, at: i64) -> Result<()> {
        sqlx::query("UPDATE entries SET last_update = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Overwrite the descriptive fields present in `details`.
    pub async fn apply_details(&self, id: EntryId, details: &EntryDetails) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE entries SET
                title = COALESCE(?, title),
                author = COALESCE(?, author),
                description = COALESCE(?, description),
                genre = COALESCE(?, genre),
                thumbnail_url = COALESCE(?, thumbnail_url),
                status = COALESCE(?, status)
            WHERE id = ?
        "#,
        )
        .bind(&details.title)
        .bind(&details.author)
        .bind(&details.description)
        .bind(&details.genre)
        .bind(&details.thumbnail_url)
        .bind(details.status.map(|s| s.code()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Excluded Scanlators
    // ========================================================================

    /// Replace the set of groups whose items are never announced as new.
    pub async fn set_excluded_scanlators(&self, id: EntryId, groups: &[&str]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM excluded_scanlators WHERE entry_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for group in groups {
            sqlx::query("INSERT OR IGNORE INTO excluded_scanlators (entry_id, scanlator) VALUES (?, ?)")
                .bind(id)
                .bind(*group)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn excluded_scanlators(&self, id: EntryId) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT scanlator FROM excluded_scanlators WHERE entry_id = ?")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(group,)| group).collect())
    }
}
