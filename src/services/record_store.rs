//! Record store — the relational `guests` table holding entry metadata.
//!
//! SQLite serializes writes internally, so the pipelines need no locking of
//! their own. All reads order by `timestamp DESC, id DESC`; the id
//! tie-breaker keeps same-millisecond uploads most-recent-first.

use crate::models::{
    entry::{GuestEntry, NewEntry},
    reports::Statistics,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Number of media URLs the public gallery projection returns.
pub const PUBLIC_GALLERY_LIMIT: i64 = 50;

const ENTRY_COLUMNS: &str =
    "id, name, message, media_url, filename, file_size, mime_type, timestamp";

#[derive(Clone, Debug)]
pub struct RecordStore {
    db: Arc<SqlitePool>,
}

impl RecordStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Create the entry table if absent. Idempotent; run once at startup.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS guests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                media_url TEXT NOT NULL,
                filename TEXT NOT NULL UNIQUE,
                file_size INTEGER NOT NULL,
                mime_type TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )",
        )
        .execute(&*self.db)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_guests_timestamp ON guests (timestamp DESC)")
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    /// Insert a new entry and return its store-assigned id.
    pub async fn insert(&self, entry: &NewEntry) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO guests (name, message, media_url, filename, file_size, mime_type, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.name)
        .bind(&entry.message)
        .bind(&entry.media_url)
        .bind(&entry.filename)
        .bind(entry.file_size)
        .bind(&entry.mime_type)
        .bind(entry.timestamp)
        .execute(&*self.db)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Public projection: media URLs only, most recent first, capped.
    pub async fn select_public(&self, limit: i64) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT media_url FROM guests ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&*self.db)
        .await
    }

    /// Full projection, most recent first, unbounded.
    pub async fn select_full(&self) -> Result<Vec<GuestEntry>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM guests ORDER BY timestamp DESC, id DESC"
        ))
        .fetch_all(&*self.db)
        .await
    }

    pub async fn select_by_id(&self, id: i64) -> Result<Option<GuestEntry>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {ENTRY_COLUMNS} FROM guests WHERE id = ?"))
            .bind(id)
            .fetch_optional(&*self.db)
            .await
    }

    /// Delete by id; returns whether a row was removed.
    pub async fn delete_by_id(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM guests WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Id/filename pairs for every entry. Input to the reconciliation sweep.
    pub async fn select_filenames(&self) -> Result<Vec<(i64, String)>, sqlx::Error> {
        sqlx::query_as("SELECT id, filename FROM guests")
            .fetch_all(&*self.db)
            .await
    }

    /// Aggregate statistics in one logical pass. Any sub-query failure
    /// fails the whole report; there is no partial result.
    pub async fn aggregate(&self, since_ts: i64) -> Result<Statistics, sqlx::Error> {
        let total_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM guests")
            .fetch_one(&*self.db)
            .await?;
        let entries_today: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM guests WHERE timestamp >= ?")
                .bind(since_ts)
                .fetch_one(&*self.db)
                .await?;
        let total_storage: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(file_size), 0) FROM guests")
                .fetch_one(&*self.db)
                .await?;
        let distinct_names: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT name) FROM guests")
            .fetch_one(&*self.db)
            .await?;
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT mime_type, COUNT(*) FROM guests GROUP BY mime_type")
                .fetch_all(&*self.db)
                .await?;

        Ok(Statistics {
            total_entries,
            entries_today,
            total_storage,
            distinct_names,
            by_mime_type: rows.into_iter().collect(),
        })
    }

    /// Trivial reachability query for the status probe.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> RecordStore {
        // One connection: with more, each pool member would see its own
        // private in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = RecordStore::new(Arc::new(pool));
        store.ensure_schema().await.unwrap();
        store
    }

    fn entry(name: &str, filename: &str, size: i64, mime: &str, ts: i64) -> NewEntry {
        NewEntry {
            name: name.into(),
            message: String::new(),
            media_url: format!("/api/media/{filename}"),
            filename: filename.into(),
            file_size: size,
            mime_type: mime.into(),
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn schema_is_idempotent() {
        let store = test_store().await;
        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let store = test_store().await;
        let a = store
            .insert(&entry("alice", "a.jpg", 10, "image/jpeg", 1))
            .await
            .unwrap();
        let b = store
            .insert(&entry("bob", "b.jpg", 10, "image/jpeg", 2))
            .await
            .unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn public_projection_is_capped_and_descending() {
        let store = test_store().await;
        for i in 0..60 {
            store
                .insert(&entry("g", &format!("{i}.png"), 1, "image/png", i))
                .await
                .unwrap();
        }
        let urls = store.select_public(PUBLIC_GALLERY_LIMIT).await.unwrap();
        assert_eq!(urls.len(), 50);
        assert_eq!(urls[0], "/api/media/59.png");
        assert_eq!(urls[49], "/api/media/10.png");
    }

    #[tokio::test]
    async fn same_timestamp_orders_newest_insert_first() {
        let store = test_store().await;
        store
            .insert(&entry("a", "first.png", 1, "image/png", 5))
            .await
            .unwrap();
        store
            .insert(&entry("b", "second.png", 1, "image/png", 5))
            .await
            .unwrap();
        let urls = store.select_public(PUBLIC_GALLERY_LIMIT).await.unwrap();
        assert_eq!(urls[0], "/api/media/second.png");
    }

    #[tokio::test]
    async fn delete_by_id_reports_missing_rows() {
        let store = test_store().await;
        let id = store
            .insert(&entry("a", "a.png", 1, "image/png", 1))
            .await
            .unwrap();
        assert!(store.delete_by_id(id).await.unwrap());
        assert!(!store.delete_by_id(id).await.unwrap());
        assert!(store.select_by_id(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn aggregate_matches_inserted_rows() {
        let store = test_store().await;
        store
            .insert(&entry("alice", "a.jpg", 100, "image/jpeg", 10))
            .await
            .unwrap();
        store
            .insert(&entry("alice", "b.png", 50, "image/png", 20))
            .await
            .unwrap();
        store
            .insert(&entry("bob", "c.png", 25, "image/png", 30))
            .await
            .unwrap();

        let stats = store.aggregate(20).await.unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.entries_today, 2);
        assert_eq!(stats.total_storage, 175);
        assert_eq!(stats.distinct_names, 2);
        assert_eq!(stats.by_mime_type.get("image/png"), Some(&2));
        assert_eq!(stats.by_mime_type.get("image/jpeg"), Some(&1));
    }
}
