use anyhow::{bail, Result};

use super::schema::Database;
use super::types::Category;
use crate::media::{CategoryId, EntryId, MediaKind, DEFAULT_CATEGORY};

impl Database {
    // ========================================================================
    // Category Operations
    // ========================================================================

    /// Trim a category name and reject blank or control-character names.
    fn clean_category_name(name: &str) -> Result<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            bail!("Category name cannot be empty or whitespace-only");
        }
        if trimmed.chars().any(char::is_control) {
            bail!("Category name cannot contain control characters");
        }
        Ok(trimmed.to_owned())
    }

    /// Create a category for one media kind, returning its id.
    ///
    /// Id 0 is reserved for the implicit default category.
    pub async fn create_category(&self, kind: MediaKind, name: &str) -> Result<CategoryId> {
        let clean_name = Self::clean_category_name(name)?;
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO categories (id, kind, name, sort_order)
            VALUES (
                (SELECT COALESCE(MAX(id), 0) + 1 FROM categories),
                ?, ?,
                (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM categories WHERE kind = ?)
            )
            RETURNING id
        "#,
        )
        .bind(kind.as_str())
        .bind(&clean_name)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn categories(&self, kind: MediaKind) -> Result<Vec<Category>> {
        let rows: Vec<(i64, String, i64)> = sqlx::query_as(
            "SELECT id, name, sort_order FROM categories WHERE kind = ? ORDER BY sort_order, name",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, sort_order)| Category {
                id,
                name,
                sort_order,
            })
            .collect())
    }

    /// Replace an entry's category memberships. An empty list (or one only
    /// naming the default category) leaves the entry uncategorized.
    pub async fn set_entry_categories(
        &self,
        entry_id: EntryId,
        categories: &[CategoryId],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM entry_categories WHERE entry_id = ?")
            .bind(entry_id)
            .execute(&mut *tx)
            .await?;
        for category in categories.iter().filter(|c| **c != DEFAULT_CATEGORY) {
            sqlx::query(
                "INSERT OR IGNORE INTO entry_categories (entry_id, category_id) VALUES (?, ?)",
            )
            .bind(entry_id)
            .bind(*category)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Category ids of an entry; `[DEFAULT_CATEGORY]` when it has none.
    pub async fn entry_categories(&self, entry_id: EntryId) -> Result<Vec<CategoryId>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT category_id FROM entry_categories WHERE entry_id = ? ORDER BY category_id",
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(vec![DEFAULT_CATEGORY]);
        }
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Delete a category; its entries fall back to the default category.
    pub async fn delete_category(&self, id: CategoryId) -> Result<()> {
        sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::media::{MediaKind, NewEntry, DEFAULT_CATEGORY};
    use crate::storage::Database;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_category_rejects_blank() {
        let db = test_db().await;
        assert!(db.create_category(MediaKind::Manga, "   ").await.is_err());
        assert!(db.create_category(MediaKind::Manga, "a\u{1b}b").await.is_err());
    }

    #[tokio::test]
    async fn test_categories_never_use_default_id() {
        let db = test_db().await;
        let reading = db.create_category(MediaKind::Manga, " Reading ").await.unwrap();
        let later = db.create_category(MediaKind::Manga, "Later").await.unwrap();
        db.create_category(MediaKind::Anime, "Watching").await.unwrap();

        assert!(reading > DEFAULT_CATEGORY);
        let manga = db.categories(MediaKind::Manga).await.unwrap();
        let names: Vec<&str> = manga.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Reading", "Later"]);
        assert_eq!(manga[1].id, later);
    }

    #[tokio::test]
    async fn test_entry_categories_default_and_cascade() {
        let db = test_db().await;
        let entry = db
            .insert_entry(NewEntry::favorite(MediaKind::Manga, 1, "/m", "M"), 0)
            .await
            .unwrap();
        assert_eq!(db.entry_categories(entry.id).await.unwrap(), vec![DEFAULT_CATEGORY]);

        let a = db.create_category(MediaKind::Manga, "A").await.unwrap();
        let b = db.create_category(MediaKind::Manga, "B").await.unwrap();
        db.set_entry_categories(entry.id, &[b, a, DEFAULT_CATEGORY])
            .await
            .unwrap();
        assert_eq!(db.entry_categories(entry.id).await.unwrap(), vec![a, b]);

        let library = db.library_entries(MediaKind::Manga).await.unwrap();
        let mut categories = library[0].categories.clone();
        categories.sort();
        assert_eq!(categories, vec![a, b]);

        db.delete_category(a).await.unwrap();
        db.delete_category(b).await.unwrap();
        assert_eq!(db.entry_categories(entry.id).await.unwrap(), vec![DEFAULT_CATEGORY]);
    }
}
