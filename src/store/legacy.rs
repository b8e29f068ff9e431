//! Backward-compat migration: absorb rows from a legacy
//! `download_temp_files` table (from a prior generation of this system)
//! into `download_tasks`, then drop it.

use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::error::Result;

/// Detects a legacy `download_temp_files` table and, if present, copies its
/// rows into `download_tasks`, joining to `files` by path, inserting each as
/// `status = pending` with the file's current priority and size, then
/// drops the legacy table. A no-op when the legacy table doesn't exist.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    let exists: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'download_temp_files'",
    )
    .fetch_optional(pool)
    .await?;

    if exists.is_none() {
        return Ok(());
    }

    info!("found legacy download_temp_files table, migrating rows into download_tasks");

    let rows = sqlx::query(
        r#"
        SELECT dtf.temp_path AS temp_path,
               COALESCE(dtf.bytes_downloaded, 0) AS bytes_downloaded,
               f.id AS file_id,
               f.priority AS priority,
               f.size AS size
        FROM download_temp_files dtf
        JOIN files f ON f.path = dtf.path
        "#,
    )
    .fetch_all(pool)
    .await?;

    let now = chrono::Utc::now().to_rfc3339();
    let mut migrated = 0usize;
    for row in &rows {
        let file_id: i64 = row.try_get("file_id")?;
        let priority: i64 = row.try_get("priority")?;
        let size: i64 = row.try_get("size")?;
        let temp_path: Option<String> = row.try_get("temp_path").ok();
        let bytes_downloaded: i64 = row.try_get("bytes_downloaded").unwrap_or(0);

        let result = sqlx::query(
            r#"
            INSERT INTO download_tasks
                (file_id, priority, size, status, temp_file_path, bytes_downloaded,
                 retry_count, max_retries, created_at, updated_at)
            VALUES (?, ?, ?, 'pending', ?, ?, 0, 3, ?, ?)
            "#,
        )
        .bind(file_id)
        .bind(priority)
        .bind(size)
        .bind(temp_path)
        .bind(bytes_downloaded)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await;

        match result {
            Ok(_) => migrated += 1,
            Err(e) => warn!(file_id, error = %e, "failed to migrate legacy temp file row, skipping"),
        }
    }

    sqlx::query("DROP TABLE download_temp_files")
        .execute(pool)
        .await?;

    info!(migrated, "legacy download_temp_files migration complete");
    Ok(())
}
