//! Media library repository

use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use likeness_core::models::{MediaItem, NewMediaItem};

use super::transaction::TransactionGuard;

/// Lock key serializing `display_order` allocation.
const DISPLAY_ORDER_LOCK: &str = "media_items.display_order";

const MEDIA_COLUMNS: &str = "id, type, source, url, thumbnail_url, caption, instagram_id, \
     instagram_username, parent_video_id, display_order, created_at";

#[derive(Clone)]
pub struct MediaItemRepository {
    pool: PgPool,
}

impl MediaItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_items", db.operation = "select"))]
    pub async fn list(&self) -> Result<Vec<MediaItem>> {
        let sql = format!(
            "SELECT {} FROM media_items ORDER BY display_order ASC, created_at ASC",
            MEDIA_COLUMNS
        );
        sqlx::query_as::<Postgres, MediaItem>(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list media items")
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_items", db.operation = "select", db.record_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<Option<MediaItem>> {
        let sql = format!("SELECT {} FROM media_items WHERE id = $1", MEDIA_COLUMNS);
        sqlx::query_as::<Postgres, MediaItem>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get media item")
    }

    #[tracing::instrument(skip(self, url), fields(db.table = "media_items", db.operation = "select"))]
    pub async fn find_video_by_url(&self, url: &str) -> Result<Option<Uuid>> {
        sqlx::query_scalar::<Postgres, Uuid>(
            "SELECT id FROM media_items WHERE url = $1 AND type = 'video' LIMIT 1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up video")
    }

    /// Appends items after the current highest `display_order` (starting at 1 on an empty table).
    #[tracing::instrument(skip(self, items), fields(db.table = "media_items", db.operation = "insert", count = items.len()))]
    pub async fn append(&self, items: &[NewMediaItem]) -> Result<Vec<MediaItem>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = TransactionGuard::begin(&self.pool).await?;
        tx.lock_key(DISPLAY_ORDER_LOCK).await?;

        let start: i32 = sqlx::query_scalar::<Postgres, i32>(
            "SELECT COALESCE(MAX(display_order), 0) + 1 FROM media_items",
        )
        .fetch_one(tx.conn())
        .await
        .context("Failed to read display order")?;

        let ids: Vec<Uuid> = items.iter().map(|_| Uuid::new_v4()).collect();
        let types: Vec<String> = items.iter().map(|i| i.media_type.to_string()).collect();
        let sources: Vec<String> = items.iter().map(|i| i.source.to_string()).collect();
        let urls: Vec<&str> = items.iter().map(|i| i.url.as_str()).collect();
        let thumbnails: Vec<Option<&str>> =
            items.iter().map(|i| i.thumbnail_url.as_deref()).collect();
        let captions: Vec<Option<&str>> = items.iter().map(|i| i.caption.as_deref()).collect();
        let instagram_ids: Vec<Option<&str>> =
            items.iter().map(|i| i.instagram_id.as_deref()).collect();
        let usernames: Vec<Option<&str>> = items
            .iter()
            .map(|i| i.instagram_username.as_deref())
            .collect();
        let parents: Vec<Option<Uuid>> = items.iter().map(|i| i.parent_video_id).collect();
        let orders: Vec<i32> = (0..items.len() as i32).map(|n| start + n).collect();

        let sql = format!(
            r#"
            INSERT INTO media_items (
                id, type, source, url, thumbnail_url, caption,
                instagram_id, instagram_username, parent_video_id, display_order
            )
            SELECT * FROM UNNEST(
                $1::uuid[], $2::text[], $3::text[], $4::text[], $5::text[], $6::text[],
                $7::text[], $8::text[], $9::uuid[], $10::int4[]
            )
            RETURNING {}
            "#,
            MEDIA_COLUMNS
        );

        let mut rows = sqlx::query_as::<Postgres, MediaItem>(&sql)
            .bind(&ids)
            .bind(&types)
            .bind(&sources)
            .bind(&urls)
            .bind(&thumbnails)
            .bind(&captions)
            .bind(&instagram_ids)
            .bind(&usernames)
            .bind(&parents)
            .bind(&orders)
            .fetch_all(tx.conn())
            .await
            .context("Failed to insert media items")?;

        tx.commit().await?;

        rows.sort_by_key(|row| row.display_order);
        Ok(rows)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_items", db.operation = "delete", db.record_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM media_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete media item")?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_items", db.operation = "delete"))]
    pub async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM media_items")
            .execute(&self.pool)
            .await
            .context("Failed to delete media items")?;
        Ok(result.rows_affected())
    }
}
