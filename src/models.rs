//! Domain entities: [`File`], [`Share`], [`DownloadTask`], and the small
//! enums that govern their state machines.
//!
//! See `SPEC_FULL.md` §3 for the full invariant list. These types are kept
//! free of storage-layer concerns (no `sqlx` queries live here); `src/store`
//! maps them to and from rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification priority. Lower numbers are more important. `Labeled`
/// shares priority 2 with `Starred` per the classification table; both map
/// to the same stored integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum Priority {
    /// Shared-with-others files. Most important.
    Shared = 1,
    /// Starred files, and files discovered under a label (the spec gives
    /// both the same numeric priority).
    StarredOrLabeled = 2,
    /// Recently modified files.
    RecentModified = 3,
    /// Recently accessed files. Defined but currently unpopulated by any
    /// sync category (see `SPEC_FULL.md` / Open Questions).
    RecentAccessed = 4,
    /// Everything else.
    Default = 5,
}

impl Priority {
    /// Raw numeric value as stored in the database.
    pub fn value(self) -> i32 {
        self as i32
    }
}

impl From<i32> for Priority {
    fn from(v: i32) -> Self {
        match v {
            1 => Priority::Shared,
            2 => Priority::StarredOrLabeled,
            3 => Priority::RecentModified,
            4 => Priority::RecentAccessed,
            _ => Priority::Default,
        }
    }
}

impl From<Priority> for i32 {
    fn from(p: Priority) -> Self {
        p.value()
    }
}

/// A `DownloadTask`'s place in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be claimed by a worker.
    Pending,
    /// Claimed by a worker and actively downloading.
    InProgress,
    /// Terminally failed; kept around until garbage-collected.
    Failed,
}

impl TaskStatus {
    /// The string stored in the `status` column. Kept explicit (rather than
    /// relying solely on the derive) since it also appears in hand-written
    /// SQL literals in `src/store`.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Failed => "failed",
        }
    }
}

/// One row per known upstream file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct File {
    /// Locally assigned id.
    pub id: i64,
    /// Upstream-supplied opaque, globally unique id.
    pub syno_file_id: String,
    /// Upstream display path, forward-slash separated.
    pub path: String,
    /// Content size in bytes.
    pub size: i64,
    /// Upstream content modification time.
    pub modified_at: Option<DateTime<Utc>>,
    /// Upstream content access time.
    pub accessed_at: Option<DateTime<Utc>>,
    /// Whether this file is starred upstream.
    pub starred: bool,
    /// Whether this file is shared upstream.
    pub shared: bool,
    /// Classification priority. 1 = most important. Only ever decreases
    /// (becomes more important) via synchronizer re-classification.
    pub priority: i32,
    /// Whether the file's bytes are present in the local cache.
    pub cached: bool,
    /// Local cache path. Empty when `cached = false`.
    pub cache_path: String,
    /// Last time this file was served (or otherwise touched) from cache.
    pub last_access_in_cache_at: Option<DateTime<Utc>>,
    /// Last time the synchronizer observed this file upstream.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Row last-update time.
    pub updated_at: DateTime<Utc>,
}

impl File {
    /// `true` when cache-state invariants hold: `cached` implies a non-empty
    /// `cache_path`.
    pub fn cache_state_consistent(&self) -> bool {
        !self.cached || !self.cache_path.is_empty()
    }
}

/// One row per public sharing token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Share {
    /// Locally assigned id.
    pub id: i64,
    /// Opaque, globally unique public token.
    pub token: String,
    /// Upstream share identifier.
    pub syno_share_id: String,
    /// The file this share points at.
    pub file_id: i64,
    /// Optional gating password, stored verbatim (compared in constant
    /// time at the read path, never hashed upstream-side).
    pub password: Option<String>,
    /// Optional expiry. Past `expires_at` means the share is treated as
    /// revoked.
    pub expires_at: Option<DateTime<Utc>>,
    /// Explicit revocation flag.
    pub revoked: bool,
    /// Opaque upstream sharing link, stored as received.
    pub sharing_link: Option<String>,
    /// Opaque upstream redirect URL, stored as received.
    pub url: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Row last-update time.
    pub updated_at: DateTime<Utc>,
}

impl Share {
    /// Whether the share is currently servable (not revoked, not expired).
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if self.revoked {
            return false;
        }
        match self.expires_at {
            Some(exp) => exp > now,
            None => true,
        }
    }

    /// Whether the share gates access behind a password.
    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// One row per in-flight or queued download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DownloadTask {
    /// Locally assigned id.
    pub id: i64,
    /// The file this task downloads.
    pub file_id: i64,
    /// Priority copied from the File at enqueue time. Never refreshed.
    pub priority: i32,
    /// Size copied from the File at enqueue time, used for queue ordering.
    pub size: i64,
    /// Current state-machine status.
    pub status: TaskStatus,
    /// Non-empty iff `status = in_progress`.
    pub worker_id: Option<String>,
    /// Set iff `status = in_progress`.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Path of the partial download, if one has been started.
    pub temp_file_path: Option<String>,
    /// Bytes written to `temp_file_path` as of the last checkpoint. The
    /// on-disk length is authoritative at resume time; this column is a
    /// best-effort checkpoint for observability and DB-driven resume hints.
    pub bytes_downloaded: i64,
    /// Number of failures so far.
    pub retry_count: i32,
    /// Failures allowed before the task becomes terminally `failed`.
    pub max_retries: i32,
    /// Earliest time this task may be claimed again after a retryable
    /// failure.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Human-readable description of the last failure, if any.
    pub last_error: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Row last-update time.
    pub updated_at: DateTime<Utc>,
}

/// A `File` row joined with the `Share` row that resolved it, as returned by
/// the share-token read path.
#[derive(Debug, Clone)]
pub struct FileWithShare {
    /// The cached-or-not file the share points at.
    pub file: File,
    /// The share record itself.
    pub share: Share,
}
