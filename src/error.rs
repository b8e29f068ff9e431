//! Crate-wide error type.
//!
//! Every fallible operation in this crate returns [`Error`]. `main.rs` is the
//! only place that widens to `anyhow::Result` (startup failures are fatal and
//! don't need a typed variant).

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds named in the error-handling design: transient network
/// failures, session expiry, insufficient space, oversized files, storage
/// constraint violations, invalid state transitions, and fatal startup
/// failures all have a home here.
#[derive(Error, Debug)]
pub enum Error {
    /// A row already exists that would violate the active-task-per-file
    /// uniqueness constraint. Callers that enqueue tasks treat this as
    /// benign.
    #[error("a record already exists for this key")]
    AlreadyExists,

    /// A requested state transition isn't legal for the current row state
    /// (e.g. claiming a task that's no longer pending).
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// The row wasn't found.
    #[error("not found")]
    NotFound,

    /// The upstream session expired and re-login also failed.
    #[error("upstream session expired and re-login failed: {0}")]
    SessionExpired(String),

    /// A transient upstream failure (5xx, timeout, connection reset).
    /// Retryable at the task level.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// The eviction rate limiter rejected this caller's attempt.
    #[error("eviction is rate limited, try again later")]
    EvictionRateLimited,

    /// No room could be made for the requested byte budget even after
    /// running eviction.
    #[error("insufficient cache space for {requested} bytes")]
    InsufficientSpace {
        /// Bytes the caller needed.
        requested: u64,
    },

    /// The file is larger than `max_cache_bytes` and can never be cached.
    #[error("file size {size} exceeds the cache's maximum file size {max}")]
    Oversized {
        /// The file's size.
        size: u64,
        /// The configured cap.
        max: u64,
    },

    /// Storage (SQLite) error.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Storage migration error.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Filesystem I/O error.
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    /// Upstream HTTP transport error.
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Anything else, carried through with context.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error should be treated as a retryable task-level
    /// failure (`Task.fail(id, msg, can_retry = true)`), as opposed to a
    /// terminal one.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Oversized { .. } | Error::AlreadyExists)
    }
}
