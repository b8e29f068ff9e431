//! [`TaskStore`](super::TaskStore) implementation over SQLite.
//!
//! `claim_next` is the one operation in this store that needs real
//! transactional isolation beyond SQLite's default writer serialization:
//! two workers racing to claim the same row must not both succeed. SQLite
//! has no `SELECT ... FOR UPDATE SKIP LOCKED`, so this uses `BEGIN
//! IMMEDIATE` to take the write lock up front, select-then-update inside
//! it, and commit — the SQLite-appropriate reading of "single transaction,
//! atomically claim" from the store contract.

use std::time::Duration;

use chrono::Utc;
use sqlx::Row;

use super::{Store, TaskStore};
use crate::error::{Error, Result};
use crate::models::{DownloadTask, TaskStatus};

/// Exponential backoff schedule, indexed by `min(retry_count - 1, len - 1)`.
pub const RETRY_BACKOFF: [Duration; 3] = [
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(30 * 60),
];

/// A newly enqueued task, as produced by the synchronizer.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub file_id: i64,
    pub priority: i32,
    pub size: i64,
    pub max_retries: i32,
}

#[async_trait::async_trait]
impl TaskStore for Store {
    async fn create(&self, task: NewTask) -> Result<DownloadTask> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO download_tasks
                (file_id, priority, size, status, bytes_downloaded, retry_count,
                 max_retries, created_at, updated_at)
            VALUES (?, ?, ?, 'pending', 0, 0, ?, ?, ?)
            "#,
        )
        .bind(task.file_id)
        .bind(task.priority)
        .bind(task.size)
        .bind(task.max_retries)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await;

        let id = match result {
            Ok(r) => r.last_insert_rowid(),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(Error::AlreadyExists);
            }
            Err(e) => return Err(e.into()),
        };

        let row = sqlx::query_as::<_, DownloadTask>("SELECT * FROM download_tasks WHERE id = ?")
            .bind(id)
            .fetch_one(self.pool())
            .await?;
        Ok(row)
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<DownloadTask>> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let claim_result: Result<Option<DownloadTask>> = async {
            let now = Utc::now();
            let candidate = sqlx::query_as::<_, DownloadTask>(
                r#"
                SELECT * FROM download_tasks
                WHERE status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= ?)
                ORDER BY priority ASC, size ASC, id ASC
                LIMIT 1
                "#,
            )
            .bind(now)
            .fetch_optional(&mut *conn)
            .await?;

            let Some(candidate) = candidate else {
                return Ok(None);
            };

            sqlx::query(
                "UPDATE download_tasks SET status = 'in_progress', worker_id = ?, claimed_at = ?, updated_at = ? WHERE id = ?",
            )
            .bind(worker_id)
            .bind(now)
            .bind(now)
            .bind(candidate.id)
            .execute(&mut *conn)
            .await?;

            let claimed = sqlx::query_as::<_, DownloadTask>(
                "SELECT * FROM download_tasks WHERE id = ?",
            )
            .bind(candidate.id)
            .fetch_one(&mut *conn)
            .await?;

            Ok(Some(claimed))
        }
        .await;

        match claim_result {
            Ok(value) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(value)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn update_progress(&self, id: i64, bytes: i64, temp_path: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE download_tasks SET bytes_downloaded = ?, temp_file_path = ?, updated_at = ? WHERE id = ?",
        )
        .bind(bytes)
        .bind(temp_path)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn fail(&self, id: i64, msg: &str, can_retry: bool) -> Result<()> {
        let Some(task) = sqlx::query_as::<_, DownloadTask>("SELECT * FROM download_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
        else {
            // Idempotent against rows already removed.
            return Ok(());
        };

        let retry_count = task.retry_count + 1;
        let now = Utc::now();

        if can_retry && retry_count <= task.max_retries {
            let backoff = RETRY_BACKOFF[(retry_count as usize - 1).min(RETRY_BACKOFF.len() - 1)];
            let next_retry_at = now + chrono::Duration::from_std(backoff).unwrap();
            sqlx::query(
                r#"
                UPDATE download_tasks SET
                    status = 'pending', worker_id = NULL, claimed_at = NULL,
                    retry_count = ?, next_retry_at = ?, last_error = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(retry_count)
            .bind(next_retry_at)
            .bind(msg)
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE download_tasks SET
                    status = 'failed', worker_id = NULL, claimed_at = NULL,
                    retry_count = ?, last_error = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(retry_count)
            .bind(msg)
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;
        }

        Ok(())
    }

    async fn complete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM download_tasks WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn release_stale(&self, max_age: Duration) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        let result = sqlx::query(
            r#"
            UPDATE download_tasks SET
                status = 'pending', worker_id = NULL, claimed_at = NULL, updated_at = ?
            WHERE status = 'in_progress' AND claimed_at < ?
            "#,
        )
        .bind(Utc::now())
        .bind(cutoff)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_oversized(&self, max_bytes: i64) -> Result<Vec<DownloadTask>> {
        let tasks = sqlx::query_as::<_, DownloadTask>(
            "SELECT * FROM download_tasks WHERE status IN ('pending', 'in_progress') AND size > ?",
        )
        .bind(max_bytes)
        .fetch_all(self.pool())
        .await?;
        Ok(tasks)
    }

    async fn purge_old_failed(&self, max_age: Duration) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        let result = sqlx::query("DELETE FROM download_tasks WHERE status = 'failed' AND updated_at < ?")
            .bind(cutoff)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn has_active_for_file(&self, file_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM download_tasks WHERE file_id = ? AND status IN ('pending', 'in_progress')) AS present",
        )
        .bind(file_id)
        .fetch_one(self.pool())
        .await?;
        let present: i64 = row.try_get("present")?;
        Ok(present != 0)
    }
}

impl DownloadTask {
    /// Convenience accessor mirroring `TaskStatus::as_str`, used in log
    /// lines.
    pub fn status_str(&self) -> &'static str {
        match self.status {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Failed => "failed",
        }
    }
}
