//! [`FileStore`](super::FileStore) implementation over SQLite.

use chrono::{DateTime, Utc};
use sqlx::Row;

use super::{FileStats, FileStore, Store};
use crate::error::Result;
use crate::models::File;

/// A newly discovered file, as produced by the synchronizer before it has a
/// local id.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub syno_file_id: String,
    pub path: String,
    pub size: i64,
    pub modified_at: Option<DateTime<Utc>>,
    pub accessed_at: Option<DateTime<Utc>>,
    pub starred: bool,
    pub shared: bool,
    pub priority: i32,
}

#[async_trait::async_trait]
impl FileStore for Store {
    async fn get_by_syno_id(&self, syno_file_id: &str) -> Result<Option<File>> {
        let file = sqlx::query_as::<_, File>("SELECT * FROM files WHERE syno_file_id = ?")
            .bind(syno_file_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(file)
    }

    async fn get(&self, id: i64) -> Result<Option<File>> {
        let file = sqlx::query_as::<_, File>("SELECT * FROM files WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(file)
    }

    async fn insert(&self, file: NewFile) -> Result<File> {
        let now = Utc::now();
        let id = sqlx::query(
            r#"
            INSERT INTO files
                (syno_file_id, path, size, modified_at, accessed_at, starred, shared,
                 priority, cached, cache_path, last_sync_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, '', ?, ?, ?)
            "#,
        )
        .bind(&file.syno_file_id)
        .bind(&file.path)
        .bind(file.size)
        .bind(file.modified_at)
        .bind(file.accessed_at)
        .bind(file.starred)
        .bind(file.shared)
        .bind(file.priority)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?
        .last_insert_rowid();

        self.get(id).await?.ok_or(crate::error::Error::NotFound)
    }

    async fn update_metadata(&self, file: &File) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE files SET
                path = ?, size = ?, modified_at = ?, accessed_at = ?,
                starred = ?, shared = ?, priority = ?, last_sync_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&file.path)
        .bind(file.size)
        .bind(file.modified_at)
        .bind(file.accessed_at)
        .bind(file.starred)
        .bind(file.shared)
        .bind(file.priority)
        .bind(file.last_sync_at)
        .bind(Utc::now())
        .bind(file.id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn update_cache_state(
        &self,
        id: i64,
        cached: bool,
        cache_path: &str,
        size: i64,
        last_access_in_cache_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE files SET
                cached = ?, cache_path = ?, size = ?, last_access_in_cache_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(cached)
        .bind(cache_path)
        .bind(size)
        .bind(last_access_in_cache_at)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn invalidate_cache(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE files SET cached = 0, cache_path = '', updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn touch_access(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE files SET last_access_in_cache_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn eviction_candidates(&self, limit: i64) -> Result<Vec<File>> {
        let files = sqlx::query_as::<_, File>(
            r#"
            SELECT * FROM files
            WHERE cached = 1
            ORDER BY priority DESC, last_access_in_cache_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(files)
    }

    async fn total_cached_size(&self) -> Result<i64> {
        let total: Option<i64> = sqlx::query_scalar("SELECT SUM(size) FROM files WHERE cached = 1")
            .fetch_one(self.pool())
            .await?;
        Ok(total.unwrap_or(0))
    }

    async fn stats(&self) -> Result<FileStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_files,
                SUM(CASE WHEN cached = 1 THEN 1 ELSE 0 END) AS cached_files,
                COALESCE(SUM(CASE WHEN cached = 1 THEN size ELSE 0 END), 0) AS cached_size_bytes
            FROM files
            "#,
        )
        .fetch_one(self.pool())
        .await?;

        Ok(FileStats {
            total_files: row.try_get("total_files")?,
            cached_files: row.try_get::<Option<i64>, _>("cached_files")?.unwrap_or(0),
            cached_size_bytes: row.try_get("cached_size_bytes")?,
        })
    }

    async fn next_to_cache(&self, limit: i64) -> Result<Vec<File>> {
        let files = sqlx::query_as::<_, File>(
            r#"
            SELECT * FROM files
            WHERE cached = 0
            ORDER BY priority ASC, size ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(files)
    }
}
