//! Download worker loop: the 9-step claim→download→commit pipeline from
//! `spec.md` §4.6.

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::admission;
use super::disk_usage;
use super::eviction::{Evictor, EvictionOutcome};
use super::progress::ProgressReporter;
use crate::error::{Error, Result};
use crate::fs_cache::CacheFs;
use crate::models::File;
use crate::queue;
use crate::store::{FileStore, TaskStore};
use crate::upstream::UpstreamClient;

/// How long an idle worker sleeps before re-polling `claim_next`.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Backoff after a claim-level error (as opposed to "nothing to claim").
const CLAIM_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Per-worker tuning, copied out of `Config::cache` so the worker loop
/// doesn't need the whole config tree.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_cache_bytes: u64,
    pub max_disk_usage_pct: f64,
    pub progress_update_interval: Duration,
}

/// One download worker. Cheap to construct; `run` owns the loop for the
/// lifetime of the process (or until cancelled).
pub struct Worker<S, U> {
    id: String,
    store: S,
    upstream: U,
    fs: CacheFs,
    evictor: Evictor<S>,
    cfg: WorkerConfig,
}

impl<S, U> Worker<S, U>
where
    S: FileStore + TaskStore + Clone + Send + Sync + 'static,
    U: UpstreamClient,
{
    pub fn new(
        id: String,
        store: S,
        upstream: U,
        fs: CacheFs,
        evictor: Evictor<S>,
        cfg: WorkerConfig,
    ) -> Self {
        Self {
            id,
            store,
            upstream,
            fs,
            evictor,
            cfg,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            let task = match queue::claim(&self.store, &self.id).await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => continue,
                        _ = cancel.cancelled() => return,
                    }
                }
                Err(e) => {
                    error!(worker = %self.id, error = %e, "claim_next failed");
                    tokio::select! {
                        _ = tokio::time::sleep(CLAIM_ERROR_BACKOFF) => continue,
                        _ = cancel.cancelled() => return,
                    }
                }
            };

            let task_id = task.id;
            if let Err(e) = self.process_task(task).await {
                error!(worker = %self.id, task_id, error = %e, "task processing failed unexpectedly");
            }
        }
    }

    async fn process_task(&self, task: crate::models::DownloadTask) -> Result<()> {
        let task_id = task.id;

        let Some(file) = self.store.get(task.file_id).await? else {
            self.store.complete(task_id).await?;
            return Ok(());
        };

        if file.cached {
            self.store.complete(task_id).await?;
            return Ok(());
        }

        if file.size as u64 > self.cfg.max_cache_bytes {
            if let Some(temp) = &task.temp_file_path {
                let _ = self.fs.remove_temp(Path::new(temp)).await;
            }
            self.store
                .fail(task_id, &format!("file size {} exceeds cache cap", file.size), false)
                .await?;
            warn!(task_id, file_id = file.id, size = file.size, "task failed: oversized");
            return Ok(());
        }

        if let Err(denial) = self.check_admission(file.size as u64).await? {
            warn!(task_id, file_id = file.id, ?denial, "admission failed, task retried later");
            self.store.fail(task_id, "insufficient cache space", true).await?;
            return Ok(());
        }

        let (resume, offset, temp_path) = self.resume_decision(&file, &task).await?;

        let download = if offset > 0 {
            self.upstream.download_file_with_range(&file.path, offset).await
        } else {
            self.upstream.download_file(&file.path).await
        };

        let stream = match download {
            Ok(stream) => stream,
            Err(e) => {
                warn!(task_id, file_id = file.id, error = %e, "download request failed");
                self.store.fail(task_id, &e.to_string(), true).await?;
                return Ok(());
            }
        };

        let reporter = ProgressReporter::new(
            stream.reader,
            self.store.clone(),
            task_id,
            temp_path.to_string_lossy().to_string(),
            offset as i64,
            self.cfg.progress_update_interval,
        );

        let write_result = self
            .fs
            .write_with_resume(&file.path, reporter, resume, &temp_path)
            .await;

        let (final_path, bytes_written) = match write_result {
            Ok(ok) => ok,
            Err(e) => {
                warn!(task_id, file_id = file.id, error = %e, "write failed, checkpointing and retrying");
                if let Some(info) = self.fs.get_temp_info(&temp_path).await {
                    let _ = self
                        .store
                        .update_progress(task_id, info.size as i64, Some(&temp_path.to_string_lossy()))
                        .await;
                }
                self.store.fail(task_id, &e.to_string(), true).await?;
                return Ok(());
            }
        };

        let now = chrono::Utc::now();
        let commit = self
            .store
            .update_cache_state(
                file.id,
                true,
                &final_path.to_string_lossy(),
                bytes_written as i64,
                now,
            )
            .await;

        if let Err(e) = commit {
            error!(task_id, file_id = file.id, error = %e, "cache-state commit failed, rolling back file");
            let _ = self.fs.remove_cached(&final_path.to_string_lossy()).await;
            self.store.fail(task_id, &e.to_string(), true).await?;
            return Ok(());
        }

        self.store.complete(task_id).await?;
        info!(task_id, file_id = file.id, bytes = bytes_written, "download committed");
        Ok(())
    }

    async fn check_admission(&self, size: u64) -> Result<std::result::Result<(), admission::AdmissionDenial>> {
        let cache_size = self.store.total_cached_size().await? as u64;
        let disk = disk_usage::get_disk_usage(self.fs.root())?;
        let check = admission::check(size, cache_size, self.cfg.max_cache_bytes, disk, self.cfg.max_disk_usage_pct);
        if check.is_ok() {
            return Ok(Ok(()));
        }

        match self.evictor.try_evict(size).await {
            Ok(EvictionOutcome::Success) => Ok(Ok(())),
            Ok(EvictionOutcome::NoCandidates) => Ok(Err(admission::AdmissionDenial::CacheBytesCap)),
            Err(Error::EvictionRateLimited) => Ok(Err(admission::AdmissionDenial::CacheBytesCap)),
            Err(e) => Err(e),
        }
    }

    /// `spec.md` §4.6 step 5: decide whether to resume a partial download
    /// and from what offset. Disk is always authoritative over the task
    /// row's `bytes_downloaded` checkpoint.
    async fn resume_decision(
        &self,
        file: &File,
        task: &crate::models::DownloadTask,
    ) -> Result<(bool, u64, std::path::PathBuf)> {
        if let (Some(temp_path), bytes) = (&task.temp_file_path, task.bytes_downloaded) {
            if bytes > 0 {
                let path = Path::new(temp_path);
                if let Some(info) = self.fs.get_temp_info(path).await {
                    let stale = match file.modified_at {
                        Some(mtime) => {
                            let temp_mtime: chrono::DateTime<chrono::Utc> = info.modified.into();
                            mtime > temp_mtime
                        }
                        None => false,
                    };

                    if stale {
                        let _ = self.fs.remove_temp(path).await;
                        let fresh_path = self.fs.temp_path(&file.path);
                        return Ok((false, 0, fresh_path));
                    }

                    return Ok((true, info.size, path.to_path_buf()));
                }
            }
        }

        let fresh_path = self.fs.temp_path(&file.path);
        Ok((false, 0, fresh_path))
    }
}
