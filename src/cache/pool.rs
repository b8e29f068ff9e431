//! Spawns the fixed-size download worker pool (`spec.md` §4.6:
//! `concurrent_downloads`, default 3).

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::eviction::Evictor;
use super::worker::{Worker, WorkerConfig};
use crate::store::{FileStore, TaskStore};
use crate::upstream::UpstreamClient;

/// Spawn `concurrent_downloads` worker tasks, each with a distinct
/// `worker_id` (`worker-0`, `worker-1`, ...), and return their join
/// handles so `main.rs` can await them at shutdown.
pub fn spawn<S, U>(
    count: usize,
    store: S,
    upstream: U,
    fs: crate::fs_cache::CacheFs,
    evictor: Evictor<S>,
    cfg: WorkerConfig,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>>
where
    S: FileStore + TaskStore + Clone + Send + Sync + 'static,
    U: UpstreamClient + Clone + Send + Sync + 'static,
{
    (0..count)
        .map(|i| {
            let worker = Worker::new(
                format!("worker-{i}"),
                store.clone(),
                upstream.clone(),
                fs.clone(),
                evictor.clone(),
                cfg.clone(),
            );
            let cancel = cancel.clone();
            tokio::spawn(async move { worker.run(cancel).await })
        })
        .collect()
}
