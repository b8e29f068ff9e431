//! Schema creation and the legacy `download_temp_files` migration.
//!
//! Schema is applied as a small ordered list of idempotent SQL steps rather
//! than a full up/down migration framework — this crate never needs to roll
//! a schema version back, only forward, so the teacher's `SqlMigration`
//! up/down shape is simplified to up-only steps tracked in the `meta`
//! table's `schema_version` key.

use sqlx::SqlitePool;

use crate::error::Result;

/// Ordered schema steps. Each is executed once; the current count is the
/// schema version persisted in `meta`.
const STEPS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS meta (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS files (
        id                       INTEGER PRIMARY KEY AUTOINCREMENT,
        syno_file_id             TEXT NOT NULL UNIQUE,
        path                     TEXT NOT NULL,
        size                     INTEGER NOT NULL DEFAULT 0,
        modified_at              TEXT,
        accessed_at              TEXT,
        starred                  INTEGER NOT NULL DEFAULT 0,
        shared                   INTEGER NOT NULL DEFAULT 0,
        priority                 INTEGER NOT NULL DEFAULT 5,
        cached                   INTEGER NOT NULL DEFAULT 0,
        cache_path               TEXT NOT NULL DEFAULT '',
        last_access_in_cache_at  TEXT,
        last_sync_at             TEXT,
        created_at               TEXT NOT NULL,
        updated_at               TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_files_path ON files(path)",
    "CREATE INDEX IF NOT EXISTS idx_files_priority ON files(priority)",
    "CREATE INDEX IF NOT EXISTS idx_files_cached ON files(cached)",
    "CREATE INDEX IF NOT EXISTS idx_files_last_access ON files(last_access_in_cache_at)",
    r#"
    CREATE TABLE IF NOT EXISTS shares (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        token          TEXT NOT NULL UNIQUE,
        syno_share_id  TEXT NOT NULL,
        file_id        INTEGER NOT NULL REFERENCES files(id),
        password       TEXT,
        expires_at     TEXT,
        revoked        INTEGER NOT NULL DEFAULT 0,
        sharing_link   TEXT,
        url            TEXT,
        created_at     TEXT NOT NULL,
        updated_at     TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_shares_file_id ON shares(file_id)",
    r#"
    CREATE TABLE IF NOT EXISTS download_tasks (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id           INTEGER NOT NULL REFERENCES files(id),
        priority          INTEGER NOT NULL,
        size              INTEGER NOT NULL,
        status            TEXT NOT NULL,
        worker_id         TEXT,
        claimed_at        TEXT,
        temp_file_path    TEXT,
        bytes_downloaded  INTEGER NOT NULL DEFAULT 0,
        retry_count       INTEGER NOT NULL DEFAULT 0,
        max_retries       INTEGER NOT NULL DEFAULT 3,
        next_retry_at     TEXT,
        last_error        TEXT,
        created_at        TEXT NOT NULL,
        updated_at        TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON download_tasks(status)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_priority_size ON download_tasks(priority, size)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_file_id ON download_tasks(file_id)",
    // Enforces "at most one active task per file" transactionally rather
    // than by prior read.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_active_per_file
    ON download_tasks(file_id)
    WHERE status IN ('pending', 'in_progress')
    "#,
];

/// Apply all schema steps, then run the legacy-table migration if needed.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    for step in STEPS {
        sqlx::query(step).execute(pool).await?;
    }
    super::legacy::migrate(pool).await?;
    Ok(())
}
