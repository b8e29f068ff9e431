//! Eviction and admission properties from `spec.md` §4.7/§8: priority+LRU
//! eviction order, the rate limiter, and the admission caps.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use synodrive_cache::cache::eviction::{Evictor, EvictionOutcome};
use synodrive_cache::fs_cache::CacheFs;
use synodrive_cache::store::{FileStore, NewFile, Store};

async fn cached_file(store: &Store, fs: &CacheFs, syno_id: &str, size: u64, priority: i32, age_minutes: i64) -> i64 {
    let file = store
        .insert(NewFile {
            syno_file_id: syno_id.to_string(),
            path: format!("/{syno_id}.bin"),
            size: size as i64,
            modified_at: None,
            accessed_at: None,
            starred: false,
            shared: false,
            priority,
        })
        .await
        .unwrap();

    let path = fs.final_path(&file.path);
    tokio::fs::write(&path, vec![0u8; size as usize]).await.unwrap();

    let last_access = Utc::now() - ChronoDuration::minutes(age_minutes);
    store
        .update_cache_state(file.id, true, &path.to_string_lossy(), size as i64, last_access)
        .await
        .unwrap();
    file.id
}

#[tokio::test]
async fn eviction_prefers_lowest_priority_then_oldest_access() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open_in_memory().await.unwrap();
    let fs = CacheFs::new(tmp.path(), 64 * 1024).await.unwrap();

    // A: priority 4 (least important), B: priority 3, C: priority 2. All
    // 400 MiB, to mirror the spec's end-to-end eviction scenario at a
    // smaller scale for test speed.
    const UNIT: u64 = 1_000_000;
    let a = cached_file(&store, &fs, "a", 400 * UNIT, 4, 30).await;
    let _b = cached_file(&store, &fs, "b", 400 * UNIT, 3, 20).await;
    let _c = cached_file(&store, &fs, "c", 400 * UNIT, 2, 10).await;

    // Cache cap exactly fits the three existing files; a 400-unit D at
    // priority 1 requires evicting exactly one file to make room.
    let max_cache_bytes = 1_200 * UNIT;
    let evictor = Evictor::new(
        store.clone(),
        fs.clone(),
        Duration::from_secs(30),
        10,
        max_cache_bytes,
        100.0,
    );

    let outcome = evictor.try_evict(400 * UNIT).await.unwrap();
    assert_eq!(outcome, EvictionOutcome::Success);

    // A (lowest priority) must be the one evicted; B and C remain cached.
    let a_after = store.get(a).await.unwrap().unwrap();
    assert!(!a_after.cached);
    assert!(a_after.cache_path.is_empty());

    let remaining = store.eviction_candidates(10).await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|f| f.id != a));
}

#[tokio::test]
async fn try_evict_is_rate_limited_within_the_interval() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open_in_memory().await.unwrap();
    let fs = CacheFs::new(tmp.path(), 64 * 1024).await.unwrap();

    let evictor = Evictor::new(
        store.clone(),
        fs.clone(),
        Duration::from_secs(60),
        10,
        1_000_000_000,
        100.0,
    );

    let first = evictor.try_evict(1).await;
    assert!(first.is_ok());

    let second = evictor.try_evict(1).await;
    assert!(matches!(second, Err(synodrive_cache::error::Error::EvictionRateLimited)));
}

#[tokio::test]
async fn eviction_reports_no_candidates_when_cache_is_empty_but_disk_is_full() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open_in_memory().await.unwrap();
    let fs = CacheFs::new(tmp.path(), 64 * 1024).await.unwrap();

    // No cached rows at all: the required bytes can never be admitted via
    // cache eviction since there's nothing to evict.
    let evictor = Evictor::new(store.clone(), fs.clone(), Duration::from_secs(30), 10, 0, 1.0);

    let outcome = evictor.try_evict(1).await.unwrap();
    assert_eq!(outcome, EvictionOutcome::NoCandidates);
}
