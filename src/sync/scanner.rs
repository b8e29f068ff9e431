//! Recursive directory scanner for the `starred`/`labeled` categories
//! (`spec.md` §4.4): walks subtrees via `list_files`, paginating, bounded
//! by a semaphore sized to `max_concurrency` — the same bounded-fan-out
//! shape the teacher uses for its worker pool's concurrent task limit.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tracing::{error, warn};

use super::classify::Category;
use super::process::process_file;
use crate::store::{FileStore, ShareStore, TaskStore};
use crate::upstream::UpstreamClient;

/// Walk `root` recursively, processing every discovered file through
/// [`process_file`] under `category` and recursing into subdirectories
/// bounded by `semaphore`. Errors from a single page or a single file are
/// logged and do not abort the scan of the rest of the tree.
pub fn scan_directory<'a, S, U>(
    store: &'a S,
    upstream: &'a U,
    category: Category,
    root: String,
    semaphore: Arc<Semaphore>,
    page_size: u32,
) -> BoxFuture<'a, ()>
where
    S: FileStore + ShareStore + TaskStore + Sync,
    U: UpstreamClient,
{
    Box::pin(async move {
        let mut offset = 0u32;
        loop {
            // Acquire only around the listing call itself: holding the
            // permit across recursion would let a deep tree deadlock once
            // its depth exceeds `max_concurrency` (every ancestor holding a
            // permit while waiting on a descendant that can never get one).
            let page = {
                let _permit = match semaphore.acquire().await {
                    Ok(p) => p,
                    Err(_) => return,
                };
                match upstream.list_files(&root, offset, page_size, None).await {
                    Ok(page) => page,
                    Err(e) => {
                        error!(path = %root, error = %e, "directory listing failed, stopping this subtree");
                        return;
                    }
                }
            };

            if page.items.is_empty() {
                break;
            }

            for item in &page.items {
                if item.is_dir {
                    scan_directory(
                        store,
                        upstream,
                        category,
                        item.path.clone(),
                        semaphore.clone(),
                        page_size,
                    )
                    .await;
                    continue;
                }

                if let Err(e) = process_file(store, upstream, category, item).await {
                    warn!(
                        syno_file_id = %item.id,
                        path = %item.path,
                        error = %e,
                        "scanned file processing failed, skipping"
                    );
                }
            }

            offset += page.items.len() as u32;
            if (offset as u64) >= page.total {
                break;
            }
        }
    })
}
