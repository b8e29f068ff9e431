//! Metadata synchronizer properties from `spec.md` §4.4/§8: classification,
//! priority-only-decreases, cache invalidation on upstream mtime advance,
//! and enqueue-on-uncached.

use chrono::{Duration as ChronoDuration, Utc};
use synodrive_cache::store::{FileStore, ShareStore, Store, TaskStore};
use synodrive_cache::sync::classify::Category;
use synodrive_cache::sync::process::process_file;
use synodrive_cache::upstream::client::MockUpstream;
use synodrive_cache::upstream::DriveFile;

fn drive_file(id: &str, path: &str, size: i64, mtime_offset_hours: i64) -> DriveFile {
    DriveFile {
        id: id.to_string(),
        path: path.to_string(),
        is_dir: false,
        size,
        mtime: Some(Utc::now() - ChronoDuration::hours(mtime_offset_hours)),
        atime: None,
        starred: false,
        shared: false,
        permanent_link: None,
        labels: Vec::new(),
    }
}

#[tokio::test]
async fn new_shared_file_is_inserted_and_enqueued_at_priority_one() {
    let store = Store::open_in_memory().await.unwrap();
    let upstream = MockUpstream::new();
    let file = drive_file("syno-1", "/a.bin", 1024, 1);

    process_file(&store, &upstream, Category::SharedWithOthers, &file)
        .await
        .unwrap();

    let row = store.get_by_syno_id("syno-1").await.unwrap().unwrap();
    assert_eq!(row.priority, 1);
    assert!(row.shared);
    assert!(!row.cached);
    assert!(store.has_active_for_file(row.id).await.unwrap());
}

#[tokio::test]
async fn reclassification_only_lowers_priority_number_never_raises_it() {
    let store = Store::open_in_memory().await.unwrap();
    let upstream = MockUpstream::new();

    // First seen as a recent-modified file (priority 3)...
    let file = drive_file("syno-2", "/b.bin", 2048, 2);
    process_file(&store, &upstream, Category::RecentModified, &file)
        .await
        .unwrap();
    let after_recent = store.get_by_syno_id("syno-2").await.unwrap().unwrap();
    assert_eq!(after_recent.priority, 3);

    // ...then discovered shared (priority 1): priority must improve.
    process_file(&store, &upstream, Category::SharedWithOthers, &file)
        .await
        .unwrap();
    let after_shared = store.get_by_syno_id("syno-2").await.unwrap().unwrap();
    assert_eq!(after_shared.priority, 1);

    // A later starred sighting (priority 2) must NOT raise it back up.
    process_file(&store, &upstream, Category::Starred, &file)
        .await
        .unwrap();
    let after_starred = store.get_by_syno_id("syno-2").await.unwrap().unwrap();
    assert_eq!(after_starred.priority, 1);
}

#[tokio::test]
async fn cached_file_is_invalidated_and_requeued_when_upstream_mtime_advances() {
    let store = Store::open_in_memory().await.unwrap();
    let upstream = MockUpstream::new();

    let old_mtime = Utc::now() - ChronoDuration::hours(5);
    let file = DriveFile {
        mtime: Some(old_mtime),
        ..drive_file("syno-3", "/c.bin", 4096, 0)
    };
    process_file(&store, &upstream, Category::Starred, &file)
        .await
        .unwrap();
    let inserted = store.get_by_syno_id("syno-3").await.unwrap().unwrap();

    // Mark it cached, as the cache engine would after a successful
    // download, with last_sync_at/modified_at matching what sync recorded.
    store
        .update_cache_state(inserted.id, true, "/cache/c.bin", 4096, Utc::now())
        .await
        .unwrap();

    let newer_mtime = Utc::now();
    let updated = DriveFile {
        mtime: Some(newer_mtime),
        ..drive_file("syno-3", "/c.bin", 4096, 0)
    };
    process_file(&store, &upstream, Category::Starred, &updated)
        .await
        .unwrap();

    let after = store.get_by_syno_id("syno-3").await.unwrap().unwrap();
    assert!(!after.cached);
    assert!(after.cache_path.is_empty());
    assert!(store.has_active_for_file(after.id).await.unwrap());
}

#[tokio::test]
async fn cached_file_with_unchanged_mtime_is_not_invalidated_or_requeued() {
    let store = Store::open_in_memory().await.unwrap();
    let upstream = MockUpstream::new();

    let mtime = Utc::now() - ChronoDuration::hours(1);
    let file = DriveFile {
        mtime: Some(mtime),
        ..drive_file("syno-4", "/d.bin", 512, 0)
    };
    process_file(&store, &upstream, Category::Starred, &file)
        .await
        .unwrap();
    let inserted = store.get_by_syno_id("syno-4").await.unwrap().unwrap();
    store
        .update_cache_state(inserted.id, true, "/cache/d.bin", 512, Utc::now())
        .await
        .unwrap();

    // Re-synced with the identical mtime: must stay cached, no new task.
    process_file(&store, &upstream, Category::Starred, &file)
        .await
        .unwrap();

    let after = store.get_by_syno_id("syno-4").await.unwrap().unwrap();
    assert!(after.cached);
    assert!(!store.has_active_for_file(after.id).await.unwrap());
}

#[tokio::test]
async fn shared_file_with_permanent_link_creates_share_record() {
    let store = Store::open_in_memory().await.unwrap();
    let upstream = MockUpstream::new();
    upstream.set_sharing(
        "syno-5",
        synodrive_cache::upstream::SharingInfo {
            sharing_link: Some("https://example/link".into()),
            url: Some("https://example/url".into()),
            protect_password: Some("hunter2".into()),
            due_date: None,
        },
    );

    let file = DriveFile {
        permanent_link: Some("tok-share-5".into()),
        ..drive_file("syno-5", "/e.bin", 100, 0)
    };
    process_file(&store, &upstream, Category::SharedWithOthers, &file)
        .await
        .unwrap();

    let share = store.get_by_token("tok-share-5").await.unwrap().unwrap();
    assert_eq!(share.password.as_deref(), Some("hunter2"));
    assert_eq!(share.sharing_link.as_deref(), Some("https://example/link"));
}
