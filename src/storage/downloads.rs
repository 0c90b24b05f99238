use anyhow::Result;

use super::schema::Database;
use super::types::QueuedDownload;
use crate::download::DownloadRequest;
use crate::media::{EntryId, ItemId};

impl Database {
    // ========================================================================
    // Download Queue
    // ========================================================================

    /// Queue downloads for an entry's items. Items already queued are left
    /// alone; returns how many were added.
    pub async fn enqueue_downloads(
        &self,
        entry_id: EntryId,
        requests: &[DownloadRequest],
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut queued = 0;
        for request in requests {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO download_queue (entry_id, item_id, key, name) VALUES (?, ?, ?, ?)",
            )
            .bind(entry_id)
            .bind(request.item_id)
            .bind(&request.key)
            .bind(&request.name)
            .execute(&mut *tx)
            .await?;
            queued += result.rows_affected();
        }
        tx.commit().await?;
        Ok(queued)
    }

    /// Pending downloads, oldest first.
    pub async fn queued_downloads(&self) -> Result<Vec<QueuedDownload>> {
        let rows = sqlx::query_as::<_, QueuedDownload>(
            "SELECT entry_id, item_id, key, name FROM download_queue ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn remove_queued_download(&self, item_id: ItemId) -> Result<()> {
        sqlx::query("DELETE FROM download_queue WHERE item_id = ?")
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
