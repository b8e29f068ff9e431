//! Maintenance loop (`spec.md` §4.8): stale-claim release, failed-task GC,
//! orphan temp-file GC. The startup `release_stale(0)` call is made once by
//! `main.rs` before the worker pool or HTTP server are allowed to start —
//! this module only owns the two recurring tickers.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::fs_cache::CacheFs;
use crate::store::TaskStore;

/// Tuning for the two maintenance tickers, copied from `Config::cache`.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub stale_task_check_interval: Duration,
    pub stale_task_timeout: Duration,
    pub cleanup_interval: Duration,
    pub failed_task_max_age: Duration,
    pub temp_file_max_age: Duration,
}

/// Release every `in_progress` task back to `pending`, preserving
/// progress. Called once at process start (`max_age = 0`) before workers
/// start claiming, so a previous run's in-flight downloads are recovered.
pub async fn release_all_stale<S: TaskStore>(store: &S) -> Result<u64> {
    let released = store.release_stale(Duration::ZERO).await?;
    if released > 0 {
        info!(released, "recovered in-progress tasks from previous run");
    }
    Ok(released)
}

/// Run both maintenance tickers until `cancel` fires.
pub async fn run<S: TaskStore>(store: S, fs: CacheFs, cfg: MaintenanceConfig, cancel: CancellationToken) {
    let mut stale_ticker = tokio::time::interval(cfg.stale_task_check_interval);
    let mut cleanup_ticker = tokio::time::interval(cfg.cleanup_interval);
    stale_ticker.tick().await;
    cleanup_ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("maintenance loop shutting down");
                return;
            }
            _ = stale_ticker.tick() => {
                match store.release_stale(cfg.stale_task_timeout).await {
                    Ok(n) if n > 0 => info!(released = n, "released stale in-progress tasks"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "stale-task release failed"),
                }
            }
            _ = cleanup_ticker.tick() => {
                match store.purge_old_failed(cfg.failed_task_max_age).await {
                    Ok(n) if n > 0 => info!(purged = n, "purged old failed tasks"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "failed-task purge failed"),
                }
                match fs.clean_old_temp_files(cfg.temp_file_max_age).await {
                    Ok(n) if n > 0 => info!(removed = n, "swept orphan temp files"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "temp-file sweep failed"),
                }
            }
        }
    }
}
