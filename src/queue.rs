//! Thin, documented façade over [`crate::store::TaskStore`].
//!
//! `spec.md` §4.5 and §8 describe a single queue contract (ordering,
//! backoff, staleness) that's otherwise easy to re-derive slightly
//! differently at each call site. This module exists to give that contract
//! one place to read and test — it does not duplicate the queue, every
//! method here is a direct pass-through to the store.

use std::time::Duration;

pub use crate::store::tasks::RETRY_BACKOFF;
use crate::error::Result;
use crate::models::DownloadTask;
use crate::store::{NewTask, TaskStore};

/// Failures allowed before a task moves to terminal `failed`, absent an
/// override from `Config::cache::max_download_retries`.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A task whose `claimed_at` is older than this is presumed abandoned by
/// its worker, absent an override from `Config::cache::stale_task_timeout`.
pub const DEFAULT_STALE_TASK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Enqueue a download for `file_id` at `priority`/`size` (both copied from
/// the `File` row at enqueue time and never refreshed — see the retained
/// Open Question in `spec.md` §9). Returns `Ok(None)` when a task already
/// exists for this file (the caller's "benign race" case), `Ok(Some(_))`
/// for a freshly created task.
pub async fn enqueue<S: TaskStore>(
    store: &S,
    file_id: i64,
    priority: i32,
    size: i64,
    max_retries: u32,
) -> Result<Option<DownloadTask>> {
    match store
        .create(NewTask {
            file_id,
            priority,
            size,
            max_retries: max_retries as i32,
        })
        .await
    {
        Ok(task) => Ok(Some(task)),
        Err(crate::error::Error::AlreadyExists) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Claim the next eligible task for `worker_id`, ordered
/// `priority ASC, size ASC, id ASC`.
pub async fn claim<S: TaskStore>(store: &S, worker_id: &str) -> Result<Option<DownloadTask>> {
    store.claim_next(worker_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, NewFile, Store};

    async fn file_id(store: &Store, syno_id: &str) -> i64 {
        store
            .insert(NewFile {
                syno_file_id: syno_id.to_string(),
                path: format!("/{syno_id}.bin"),
                size: 10,
                modified_at: None,
                accessed_at: None,
                starred: false,
                shared: false,
                priority: 3,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn enqueue_returns_none_on_an_already_queued_file() {
        let store = Store::open_in_memory().await.unwrap();
        let id = file_id(&store, "a").await;

        let first = enqueue(&store, id, 3, 10, DEFAULT_MAX_RETRIES).await.unwrap();
        assert!(first.is_some());

        let second = enqueue(&store, id, 3, 10, DEFAULT_MAX_RETRIES).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn claim_returns_the_enqueued_task_and_then_nothing() {
        let store = Store::open_in_memory().await.unwrap();
        let id = file_id(&store, "b").await;
        enqueue(&store, id, 3, 10, DEFAULT_MAX_RETRIES).await.unwrap();

        let claimed = claim(&store, "worker-0").await.unwrap();
        assert!(claimed.is_some());
        assert!(claim(&store, "worker-0").await.unwrap().is_none());
    }
}
