//! Transactional persistence store: files, shares, and the download task
//! queue, backed by SQLite via `sqlx`.
//!
//! The store is deliberately split into three trait surfaces
//! ([`FileStore`], [`ShareStore`], [`TaskStore`]) rather than one big
//! "repository" interface. The File split in particular encodes the
//! dual-owner rule from the data model: the synchronizer only ever calls
//! [`FileStore::update_metadata`], the cache engine only ever calls
//! [`FileStore::update_cache_state`] and [`FileStore::invalidate_cache`].
//! Neither touches the other's columns, so a stale read on one side can
//! never clobber a fresh write on the other.

pub mod files;
pub mod legacy;
pub mod migrations;
pub mod shares;
pub mod tasks;

use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::Result;
use crate::models::{DownloadTask, File, FileWithShare, Share};

pub use files::NewFile;
pub use tasks::NewTask;

/// Tuning knobs for the SQLite connection pool, taken from
/// `Config::database` plus the cache root (for the default path).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: std::path::PathBuf,
    pub cache_size_mb: i64,
    pub busy_timeout_ms: u64,
}

/// Cloneable handle to the persistence store. Every method takes `&self`
/// and is safe to call from any number of concurrent tasks — SQLite
/// serializes writers internally, and `claim_next` additionally wraps its
/// select-then-update in an `IMMEDIATE` transaction so two concurrent
/// claimers can't both win the same row.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the SQLite database at `config.path`,
    /// apply pragmas, run schema migrations, and run the legacy-table
    /// migration.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(16)
            .connect_with(connect_options)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;
        sqlx::query(&format!("PRAGMA cache_size=-{}", config.cache_size_mb * 1024))
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        migrations::run(&pool).await?;

        info!(path = %config.path.display(), "store opened");

        Ok(Self { pool })
    }

    /// Open an in-memory store. Used by tests.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await?;
        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    /// Cheap liveness check for `GET /health`.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Synchronizer-owned operations on `File` rows: creation and metadata
/// fields only. Must never write `cached`, `cache_path`, or
/// `last_access_in_cache_at`.
#[async_trait::async_trait]
pub trait FileStore {
    /// Look up a file by its upstream id.
    async fn get_by_syno_id(&self, syno_file_id: &str) -> Result<Option<File>>;
    /// Look up a file by its local id.
    async fn get(&self, id: i64) -> Result<Option<File>>;
    /// Insert a newly discovered file.
    async fn insert(&self, file: NewFile) -> Result<File>;
    /// Overwrite path/size/mtime/atime/priority/flags/last_sync_at only.
    async fn update_metadata(&self, file: &File) -> Result<()>;
    /// Cache-engine-owned: overwrite cache-state columns only.
    async fn update_cache_state(
        &self,
        id: i64,
        cached: bool,
        cache_path: &str,
        size: i64,
        last_access_in_cache_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()>;
    /// Atomically clear `cached`/`cache_path` without touching metadata.
    async fn invalidate_cache(&self, id: i64) -> Result<()>;
    /// Touch `last_access_in_cache_at` to now, for serve-time bumps.
    async fn touch_access(&self, id: i64) -> Result<()>;
    /// Eviction candidates: cached files ordered by
    /// `priority DESC, last_access_in_cache_at ASC, id ASC`.
    async fn eviction_candidates(&self, limit: i64) -> Result<Vec<File>>;
    /// Aggregate size of all currently cached files.
    async fn total_cached_size(&self) -> Result<i64>;
    /// Snapshot counters for `GET /debug/stats`.
    async fn stats(&self) -> Result<FileStats>;
    /// Files not yet cached, for `GET /debug/files`.
    async fn next_to_cache(&self, limit: i64) -> Result<Vec<File>>;
}

/// Aggregate counters backing the debug stats endpoint.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FileStats {
    pub total_files: i64,
    pub cached_files: i64,
    pub cached_size_bytes: i64,
}

/// Share-record operations.
#[async_trait::async_trait]
pub trait ShareStore {
    async fn get_by_token(&self, token: &str) -> Result<Option<Share>>;
    async fn get_file_by_share_token(&self, token: &str) -> Result<Option<FileWithShare>>;
    async fn upsert(&self, share: NewShare) -> Result<Share>;
    async fn count_active(&self) -> Result<i64>;
}

/// A share as produced by the synchronizer, ready to be upserted.
#[derive(Debug, Clone)]
pub struct NewShare {
    pub token: String,
    pub syno_share_id: String,
    pub file_id: i64,
    pub password: Option<String>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub sharing_link: Option<String>,
    pub url: Option<String>,
}

/// Download task queue operations. See `SPEC_FULL.md` §4.5 / `spec.md`
/// §4.1 for the full contract.
#[async_trait::async_trait]
pub trait TaskStore {
    /// Fails with `Error::AlreadyExists` if an active task already exists
    /// for `task.file_id`; enforced by a partial unique index, not a prior
    /// read.
    async fn create(&self, task: NewTask) -> Result<DownloadTask>;
    /// Atomically claim the next eligible pending task, ordered by
    /// `priority ASC, size ASC, id ASC`.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<DownloadTask>>;
    /// Update only the progress-checkpoint fields; never changes status.
    async fn update_progress(&self, id: i64, bytes: i64, temp_path: Option<&str>) -> Result<()>;
    /// Record a failure. Retryable failures go back to `pending` with
    /// backoff; terminal failures move to `failed`.
    async fn fail(&self, id: i64, msg: &str, can_retry: bool) -> Result<()>;
    /// Delete the task row — the terminal "success" transition.
    async fn complete(&self, id: i64) -> Result<()>;
    /// Revert every `in_progress` task whose `claimed_at` is older than
    /// `max_age` back to `pending`, preserving progress. `max_age = 0`
    /// releases everything (used once at startup).
    async fn release_stale(&self, max_age: Duration) -> Result<u64>;
    /// Active tasks (pending or in_progress) whose `size > max_bytes`.
    async fn get_oversized(&self, max_bytes: i64) -> Result<Vec<DownloadTask>>;
    /// Delete failed tasks older than `max_age`.
    async fn purge_old_failed(&self, max_age: Duration) -> Result<u64>;
    /// Whether an active task already exists for this file.
    async fn has_active_for_file(&self, file_id: i64) -> Result<bool>;
}

