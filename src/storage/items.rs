use anyhow::Result;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{ItemRow, ITEM_COLUMNS};
use crate::media::{EntryId, ItemId, LibraryItem};

impl Database {
    // ========================================================================
    // Item Operations
    // ========================================================================

    /// Items of one entry in listing order.
    pub async fn items_for_entry<I: LibraryItem>(&self, entry_id: EntryId) -> Result<Vec<I>> {
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE entry_id = ? ORDER BY source_order, id"
        ))
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ItemRow::into_item).collect())
    }

    /// Insert items in one transaction; the returned copies carry their ids.
    pub async fn insert_items<I: LibraryItem>(&self, items: &[I]) -> Result<Vec<I>> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(items.len());

        for item in items {
            let core = item.core();
            let resume = item.resume();
            let (id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO items (entry_id, url, name, scanlator, number, source_order,
                                   date_fetch, date_upload, read, bookmark,
                                   resume_position, resume_total)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id
            "#,
            )
            .bind(core.entry_id)
            .bind(&core.url)
            .bind(&core.name)
            .bind(&core.scanlator)
            .bind(core.number.value())
            .bind(core.source_order)
            .bind(core.date_fetch)
            .bind(core.date_upload)
            .bind(core.read)
            .bind(core.bookmark)
            .bind(resume.position)
            .bind(resume.total)
            .fetch_one(&mut *tx)
            .await?;

            let mut stored = item.clone();
            stored.core_mut().id = id;
            inserted.push(stored);
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Write back listing metadata and user state of existing items.
    pub async fn update_items<I: LibraryItem>(&self, items: &[I]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            let core = item.core();
            let resume = item.resume();
            sqlx::query(
                r#"
                UPDATE items SET
                    name = ?, scanlator = ?, number = ?, source_order = ?,
                    date_fetch = ?, date_upload = ?, read = ?, bookmark = ?,
                    resume_position = ?, resume_total = ?
                WHERE id = ?
            "#,
            )
            .bind(&core.name)
            .bind(&core.scanlator)
            .bind(core.number.value())
            .bind(core.source_order)
            .bind(core.date_fetch)
            .bind(core.date_upload)
            .bind(core.read)
            .bind(core.bookmark)
            .bind(resume.position)
            .bind(resume.total)
            .bind(core.id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Delete items by id in a single statement per chunk.
    pub async fn delete_items(&self, ids: &[ItemId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        const BATCH_SIZE: usize = 500;
        let mut tx = self.pool.begin().await?;
        for chunk in ids.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("DELETE FROM items WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Mark items read or unread.
    pub async fn set_items_read(&self, ids: &[ItemId], read: bool) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("UPDATE items SET read = ? WHERE id = ?")
                .bind(read)
                .bind(*id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
