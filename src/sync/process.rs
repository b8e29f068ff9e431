//! Per-file processing: the routine shared by every sync category
//! (`spec.md` §4.4, step list under "Per-file processing").

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::classify::Category;
use crate::error::Result;
use crate::models::File;
use crate::queue;
use crate::store::{FileStore, NewFile, ShareStore, TaskStore};
use crate::upstream::{DriveFile, SharingInfo, UpstreamClient};

/// Process one discovered `DriveFile` under `category`: upsert its `File`
/// row, apply the cache-invalidation rule, and enqueue a download task if
/// the file is (now) uncached. A single file's failure is caught by the
/// caller and logged/skipped — this function returns `Err` on any failure
/// so the caller can do exactly that.
pub async fn process_file<S, U>(
    store: &S,
    upstream: &U,
    category: Category,
    drive_file: &DriveFile,
) -> Result<()>
where
    S: FileStore + ShareStore + TaskStore,
    U: UpstreamClient,
{
    let new_priority = category.priority().value();
    let existing = store.get_by_syno_id(&drive_file.id).await?;

    let (file_id, now_cached) = match existing {
        Some(mut file) => {
            let invalidate = should_invalidate(&file, drive_file.mtime);

            file.path = drive_file.path.clone();
            file.size = drive_file.size;
            file.modified_at = drive_file.mtime;
            file.accessed_at = drive_file.atime;
            file.last_sync_at = Some(Utc::now());
            if category.sets_starred() {
                file.starred = true;
            }
            if category.sets_shared() {
                file.shared = true;
            }
            file.priority = file.priority.min(new_priority);

            store.update_metadata(&file).await?;

            if invalidate {
                store.invalidate_cache(file.id).await?;
                file.cached = false;
                debug!(
                    file_id = file.id,
                    syno_file_id = %drive_file.id,
                    "upstream mtime advanced past cached copy, invalidated"
                );
            }

            (file.id, file.cached)
        }
        None => {
            let inserted = store
                .insert(NewFile {
                    syno_file_id: drive_file.id.clone(),
                    path: drive_file.path.clone(),
                    size: drive_file.size,
                    modified_at: drive_file.mtime,
                    accessed_at: drive_file.atime,
                    starred: category.sets_starred(),
                    shared: category.sets_shared(),
                    priority: new_priority,
                })
                .await?;
            (inserted.id, false)
        }
    };

    if !now_cached {
        maybe_enqueue(store, file_id).await?;
    }

    if category.creates_share() {
        if let Some(link) = drive_file.permanent_link.as_deref().filter(|l| !l.is_empty()) {
            if let Err(e) = upsert_share(store, upstream, file_id, &drive_file.id, link).await {
                warn!(syno_file_id = %drive_file.id, error = %e, "share upsert failed, skipping");
            }
        }
    }

    Ok(())
}

/// `spec.md` §4.4 step 2's cache-invalidation rule: only fires when the
/// file is already cached, has a previously known mtime, and the new mtime
/// is strictly newer.
fn should_invalidate(existing: &File, new_mtime: Option<DateTime<Utc>>) -> bool {
    let (Some(old), Some(new)) = (existing.modified_at, new_mtime) else {
        return false;
    };
    existing.cached && new > old
}

/// Re-read the file's current state and enqueue a download task if it's
/// still uncached and has no active task. The task is created at the
/// File's own (already-reconciled) priority, per §3's "copied from the
/// File at enqueue" rule — not the calling category's priority, which may
/// be worse than what an earlier category already settled on this file.
/// `AlreadyExists` (another category or a prior sync pass beat us to it)
/// is swallowed as benign, per §4.4 step 4 and §7.
async fn maybe_enqueue<S>(store: &S, file_id: i64) -> Result<()>
where
    S: FileStore + TaskStore,
{
    let Some(file) = store.get(file_id).await? else {
        return Ok(());
    };
    if file.cached {
        return Ok(());
    }
    if store.has_active_for_file(file_id).await? {
        return Ok(());
    }

    queue::enqueue(
        store,
        file_id,
        file.priority,
        file.size,
        queue::DEFAULT_MAX_RETRIES,
    )
    .await?;
    Ok(())
}

/// Upsert the `Share` row for a shared file. `get_advance_sharing` is
/// fetched and its result overwrites `sharing_link`/`url`/`password`/
/// `expires_at` unconditionally when it succeeds — upstream is
/// authoritative. On failure the stale values are conservatively kept (the
/// retained Open Question from `spec.md` §9 / `SPEC_FULL.md`), so this
/// function returns early rather than upserting with empty data.
async fn upsert_share<S, U>(
    store: &S,
    upstream: &U,
    file_id: i64,
    syno_file_id: &str,
    permanent_link: &str,
) -> Result<()>
where
    S: ShareStore,
    U: UpstreamClient,
{
    let sharing: SharingInfo = upstream.get_advance_sharing(syno_file_id).await?;

    store
        .upsert(crate::store::NewShare {
            token: permanent_link.to_string(),
            syno_share_id: syno_file_id.to_string(),
            file_id,
            password: sharing.protect_password,
            expires_at: sharing.due_date,
            sharing_link: sharing.sharing_link,
            url: sharing.url,
        })
        .await?;
    Ok(())
}
