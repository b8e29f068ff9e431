//! Metadata synchronizer: the two periodic discovery loops (`spec.md`
//! §4.4) plus the shared per-category and per-file processing they both
//! drive.

pub mod classify;
pub mod process;
pub mod scanner;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, SyncConfig};
use crate::store::{FileStore, ShareStore, TaskStore};
use crate::upstream::UpstreamClient;
use classify::Category;
use process::process_file;

/// Runs the full and incremental sync tickers. Generic over the store and
/// upstream client so tests can drive it against an in-memory store and a
/// [`crate::upstream::client::MockUpstream`].
pub struct Synchronizer<S, U> {
    store: S,
    upstream: U,
    cfg: SyncConfig,
    recent_modified_days: u32,
    scan_semaphore: Arc<Semaphore>,
}

impl<S, U> Synchronizer<S, U>
where
    S: FileStore + ShareStore + TaskStore + Sync + Send + Clone + 'static,
    U: UpstreamClient + Clone + 'static,
{
    pub fn new(store: S, upstream: U, cfg: &Config) -> Self {
        let scan_semaphore = Arc::new(Semaphore::new(cfg.sync.max_concurrency.max(1)));
        Self {
            store,
            upstream,
            cfg: cfg.sync.clone(),
            recent_modified_days: cfg.cache.recent_modified_days,
            scan_semaphore,
        }
    }

    /// Run both tickers until `cancel` fires. Intended to be spawned as one
    /// long-lived task from `main.rs`.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut full = tokio::time::interval(self.cfg.full_scan_interval);
        let mut incremental = tokio::time::interval(self.cfg.incremental_interval);
        // First tick fires immediately; the process already did its
        // "initial discovery" implicitly via that first tick rather than a
        // separate bootstrap pass.
        full.tick().await;
        incremental.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("synchronizer shutting down");
                    return;
                }
                _ = full.tick() => {
                    info!("starting full sync");
                    self.run_pass(false).await;
                }
                _ = incremental.tick() => {
                    self.run_pass(true).await;
                }
            }
        }
    }

    /// One pass over all four categories. `incremental` only changes the
    /// log severity on failures, per §4.4.
    async fn run_pass(&self, incremental: bool) {
        if let Err(e) = self.sync_category(Category::SharedWithOthers).await {
            self.log_category_failure(incremental, "shared", &e);
        }
        if let Err(e) = self.sync_category(Category::Starred).await {
            self.log_category_failure(incremental, "starred", &e);
        }
        if let Err(e) = self.sync_labels().await {
            self.log_category_failure(incremental, "labeled", &e);
        }
        if let Err(e) = self.sync_recent().await {
            self.log_category_failure(incremental, "recent", &e);
        }
    }

    fn log_category_failure(&self, incremental: bool, category: &str, err: &crate::error::Error) {
        if incremental {
            warn!(category, error = %err, "incremental sync category failed");
        } else {
            error!(category, error = %err, "full sync category failed");
        }
    }

    /// Paginate one non-label category top to bottom, processing every
    /// file and recursing into directories the category scans.
    async fn sync_category(&self, category: Category) -> crate::error::Result<()> {
        let mut offset = 0u32;
        loop {
            let page = match category {
                Category::SharedWithOthers => {
                    self.upstream
                        .get_shared_files(offset, self.cfg.page_size)
                        .await?
                }
                Category::Starred => {
                    self.upstream
                        .get_starred_files(offset, self.cfg.page_size)
                        .await?
                }
                Category::RecentModified => {
                    self.upstream
                        .get_recent_files(offset, self.cfg.page_size)
                        .await?
                }
                Category::Labeled => unreachable!("labels are paginated per-label in sync_labels"),
            };

            if page.items.is_empty() {
                break;
            }

            for item in &page.items {
                if item.is_dir && category.scans_dirs() {
                    scanner::scan_directory(
                        &self.store,
                        &self.upstream,
                        category,
                        item.path.clone(),
                        self.scan_semaphore.clone(),
                        self.cfg.page_size,
                    )
                    .await;
                    continue;
                }

                if category == Category::RecentModified && self.skip_recent(item) {
                    continue;
                }

                if let Err(e) = process_file(&self.store, &self.upstream, category, item).await {
                    warn!(
                        syno_file_id = %item.id,
                        category = category.label(),
                        error = %e,
                        "file processing failed, skipping"
                    );
                }
            }

            offset += page.items.len() as u32;
            if (offset as u64) >= page.total {
                break;
            }
        }
        Ok(())
    }

    /// Recency special cases from §4.4: skip directories, skip files
    /// already owned by `shared`/`starred`, skip files older than the
    /// recency window (`cache.recent_modified_days`, per the config
    /// contract in §6 — it lives on `CacheConfig` even though this check
    /// runs during sync; see `DESIGN.md`).
    fn skip_recent(&self, item: &crate::upstream::DriveFile) -> bool {
        if item.is_dir {
            return true;
        }
        if item.shared || item.starred {
            return true;
        }
        let Some(mtime) = item.mtime else {
            return true;
        };
        let cutoff = Utc::now() - chrono::Duration::days(self.recent_modified_days as i64);
        mtime < cutoff
    }

    /// Labels are fetched once per pass, filtered against the exclude
    /// list, then each remaining label is paginated independently.
    async fn sync_labels(&self) -> crate::error::Result<()> {
        let labels = self.upstream.get_labels().await?;
        for label in labels {
            if self.cfg.exclude_labels.iter().any(|n| n == &label.name) {
                continue;
            }

            let mut offset = 0u32;
            loop {
                let page = match self
                    .upstream
                    .get_labeled_files(&label.id, offset, self.cfg.page_size)
                    .await
                {
                    Ok(page) => page,
                    Err(e) => {
                        warn!(label = %label.name, error = %e, "labeled category fetch failed, skipping label");
                        break;
                    }
                };

                if page.items.is_empty() {
                    break;
                }

                for item in &page.items {
                    if item.is_dir {
                        scanner::scan_directory(
                            &self.store,
                            &self.upstream,
                            Category::Labeled,
                            item.path.clone(),
                            self.scan_semaphore.clone(),
                            self.cfg.page_size,
                        )
                        .await;
                        continue;
                    }

                    if let Err(e) =
                        process_file(&self.store, &self.upstream, Category::Labeled, item).await
                    {
                        warn!(
                            syno_file_id = %item.id,
                            label = %label.name,
                            error = %e,
                            "labeled file processing failed, skipping"
                        );
                    }
                }

                offset += page.items.len() as u32;
                if (offset as u64) >= page.total {
                    break;
                }
            }
        }
        Ok(())
    }
}
