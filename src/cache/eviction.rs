//! Rate-limited priority+LRU evictor (`spec.md` §4.7).
//!
//! The rate limiter is a single mutex-guarded last-run timestamp — not
//! per-worker — per the Design Notes §9 hint: contention here is
//! negligible next to the downloads it's gating.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use super::admission::{self, AdmissionDenial};
use super::disk_usage::{self, DiskUsage};
use crate::error::{Error, Result};
use crate::fs_cache::CacheFs;
use crate::store::{FileStore, TaskStore};

/// What one eviction run accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionOutcome {
    /// Admission for the requested size now succeeds.
    Success,
    /// Candidates were exhausted before admission succeeded; the disk may
    /// be full of non-cache files.
    NoCandidates,
}

/// Shared evictor state. One instance is constructed in `main.rs` and
/// cloned (it's cheap — an `Arc` internally) into every worker.
#[derive(Clone)]
pub struct Evictor<S> {
    store: S,
    fs: CacheFs,
    last_run: Arc<Mutex<Option<Instant>>>,
    interval: Duration,
    batch_size: i64,
    max_cache_bytes: u64,
    max_disk_usage_pct: f64,
}

impl<S> Evictor<S>
where
    S: FileStore + TaskStore,
{
    pub fn new(
        store: S,
        fs: CacheFs,
        interval: Duration,
        batch_size: usize,
        max_cache_bytes: u64,
        max_disk_usage_pct: f64,
    ) -> Self {
        Self {
            store,
            fs,
            last_run: Arc::new(Mutex::new(None)),
            interval,
            batch_size: batch_size as i64,
            max_cache_bytes,
            max_disk_usage_pct,
        }
    }

    /// Attempt to make room for `required_bytes`. Returns
    /// `Err(EvictionRateLimited)` if another caller ran an eviction within
    /// the last `interval`; otherwise runs one eviction pass and returns
    /// its outcome.
    pub async fn try_evict(&self, required_bytes: u64) -> Result<EvictionOutcome> {
        {
            let mut guard = self.last_run.lock();
            let now = Instant::now();
            if let Some(last) = *guard {
                if now.duration_since(last) < self.interval {
                    return Err(Error::EvictionRateLimited);
                }
            }
            *guard = Some(now);
        }

        self.purge_oversized_tasks().await?;
        self.evict_until_admitted(required_bytes).await
    }

    /// Step 1 of one eviction run: tasks whose file is too big to ever fit
    /// under the current cache cap are purged outright (temp file + row),
    /// independent of whether eviction ultimately succeeds.
    async fn purge_oversized_tasks(&self) -> Result<()> {
        let oversized = self.store.get_oversized(self.max_cache_bytes as i64).await?;
        for task in oversized {
            if let Some(temp_path) = &task.temp_file_path {
                let _ = self.fs.remove_temp(std::path::Path::new(temp_path)).await;
            }
            self.store.complete(task.id).await?;
            info!(task_id = task.id, file_id = task.file_id, "purged oversized task");
        }
        Ok(())
    }

    async fn evict_until_admitted(&self, required_bytes: u64) -> Result<EvictionOutcome> {
        let mut cache_size = self.store.total_cached_size().await? as u64;
        let mut disk = disk_usage::get_disk_usage(self.fs.root())?;

        loop {
            if admission::check(
                required_bytes,
                cache_size,
                self.max_cache_bytes,
                disk,
                self.max_disk_usage_pct,
            )
            .is_ok()
            {
                return Ok(EvictionOutcome::Success);
            }

            let candidates = self.store.eviction_candidates(self.batch_size).await?;
            if candidates.is_empty() {
                warn!(
                    required_bytes,
                    cache_size,
                    disk_used_percent = disk.used_percent,
                    max_cache_bytes = self.max_cache_bytes,
                    max_disk_usage_pct = self.max_disk_usage_pct,
                    "eviction candidates exhausted, admission still failing"
                );
                return Ok(EvictionOutcome::NoCandidates);
            }

            for candidate in candidates {
                if admission::check(
                    required_bytes,
                    cache_size,
                    self.max_cache_bytes,
                    disk,
                    self.max_disk_usage_pct,
                )
                .is_ok()
                {
                    break;
                }

                let _ = self.fs.remove_cached(&candidate.cache_path).await;
                self.store.invalidate_cache(candidate.id).await?;

                let freed = candidate.size.max(0) as u64;
                cache_size = cache_size.saturating_sub(freed);
                disk.used = disk.used.saturating_sub(freed);
                disk.free = disk.free.saturating_add(freed);
                disk.used_percent = if disk.total == 0 {
                    0.0
                } else {
                    (disk.used as f64 / disk.total as f64) * 100.0
                };

                info!(
                    file_id = candidate.id,
                    path = %candidate.path,
                    size = candidate.size,
                    priority = candidate.priority,
                    "evicted cached file"
                );
            }
        }
    }
}

/// Friendlier name for callers pattern-matching on [`AdmissionDenial`]
/// without needing to import it directly.
pub type DenialReason = AdmissionDenial;

/// Re-exported for callers (the worker pool) that need a disk-usage
/// snapshot without depending on the `disk_usage` module path directly.
pub fn current_disk_usage(root: &std::path::Path) -> Result<DiskUsage> {
    disk_usage::get_disk_usage(root)
}
