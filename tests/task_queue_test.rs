//! Task queue properties from `spec.md` §8: uniqueness, exclusive claim,
//! priority ordering, and stale-claim release.

use std::time::Duration;

use synodrive_cache::error::Error;
use synodrive_cache::store::{FileStore, NewFile, NewTask, Store, TaskStore};

async fn new_store() -> Store {
    Store::open_in_memory().await.expect("open in-memory store")
}

async fn insert_file(store: &Store, syno_id: &str, size: i64, priority: i32) -> i64 {
    let file = store
        .insert(NewFile {
            syno_file_id: syno_id.to_string(),
            path: format!("/{syno_id}.bin"),
            size,
            modified_at: None,
            accessed_at: None,
            starred: false,
            shared: false,
            priority,
        })
        .await
        .expect("insert file");
    file.id
}

#[tokio::test]
async fn create_is_unique_per_active_file() {
    let store = new_store().await;
    let file_id = insert_file(&store, "a", 100, 3).await;

    let first = store
        .create(NewTask {
            file_id,
            priority: 3,
            size: 100,
            max_retries: 3,
        })
        .await;
    assert!(first.is_ok());

    let second = store
        .create(NewTask {
            file_id,
            priority: 3,
            size: 100,
            max_retries: 3,
        })
        .await;
    assert!(matches!(second, Err(Error::AlreadyExists)));
}

#[tokio::test]
async fn claim_next_is_exclusive_across_concurrent_workers() {
    let store = new_store().await;

    // 5 files, 5 tasks; 8 "workers" race to claim concurrently. Exactly 5
    // claims can succeed in one round (min(K, T) = min(8, 5) = 5).
    for i in 0..5 {
        let file_id = insert_file(&store, &format!("f{i}"), 10, 3).await;
        store
            .create(NewTask {
                file_id,
                priority: 3,
                size: 10,
                max_retries: 3,
            })
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for w in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.claim_next(&format!("worker-{w}")).await.unwrap()
        }));
    }

    let mut claimed_ids = std::collections::HashSet::new();
    let mut claimed_count = 0;
    for handle in handles {
        if let Some(task) = handle.await.unwrap() {
            assert!(claimed_ids.insert(task.id), "same task claimed twice");
            claimed_count += 1;
        }
    }

    assert_eq!(claimed_count, 5);
}

#[tokio::test]
async fn claim_next_orders_by_priority_then_size_then_id() {
    let store = new_store().await;

    // Deliberately inserted out of order: the claim order must come out
    // priority ASC, size ASC regardless of insertion order.
    let mut expectations = Vec::new();
    for (syno, priority, size) in [
        ("big-p1", 1, 500),
        ("small-p1", 1, 100),
        ("mid-p2", 2, 50),
        ("small-p3", 3, 10),
    ] {
        let file_id = insert_file(&store, syno, size, priority).await;
        let task = store
            .create(NewTask {
                file_id,
                priority,
                size,
                max_retries: 3,
            })
            .await
            .unwrap();
        expectations.push((task.id, priority, size));
    }

    let mut claimed_order = Vec::new();
    while let Some(task) = store.claim_next("solo-worker").await.unwrap() {
        claimed_order.push((task.priority, task.size));
    }

    assert_eq!(claimed_order, vec![(1, 100), (1, 500), (2, 50), (3, 10)]);
}

#[tokio::test]
async fn fail_with_retry_schedules_backoff_and_reverts_to_pending() {
    let store = new_store().await;
    let file_id = insert_file(&store, "retryme", 10, 3).await;
    store
        .create(NewTask {
            file_id,
            priority: 3,
            size: 10,
            max_retries: 3,
        })
        .await
        .unwrap();

    let task = store.claim_next("worker-0").await.unwrap().unwrap();
    store.fail(task.id, "connection reset", true).await.unwrap();

    // Immediately after a first failure the task is pending again but not
    // yet eligible (next_retry_at is in the future), so a second claim
    // attempt must see nothing.
    let none = store.claim_next("worker-0").await.unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn fail_without_retry_moves_to_terminal_failed() {
    let store = new_store().await;
    let file_id = insert_file(&store, "oversize", 10, 3).await;
    let created = store
        .create(NewTask {
            file_id,
            priority: 3,
            size: 10,
            max_retries: 3,
        })
        .await
        .unwrap();

    let task = store.claim_next("worker-0").await.unwrap().unwrap();
    assert_eq!(task.id, created.id);
    store.fail(task.id, "oversized", false).await.unwrap();

    // A terminally failed task is never claimable again.
    assert!(store.claim_next("worker-0").await.unwrap().is_none());
}

#[tokio::test]
async fn complete_deletes_the_row() {
    let store = new_store().await;
    let file_id = insert_file(&store, "done", 10, 3).await;
    store
        .create(NewTask {
            file_id,
            priority: 3,
            size: 10,
            max_retries: 3,
        })
        .await
        .unwrap();

    let task = store.claim_next("worker-0").await.unwrap().unwrap();
    store.complete(task.id).await.unwrap();

    assert!(!store.has_active_for_file(file_id).await.unwrap());
}

#[tokio::test]
async fn release_stale_reverts_abandoned_claims_and_preserves_progress() {
    let store = new_store().await;
    let file_id = insert_file(&store, "stale", 1000, 3).await;
    store
        .create(NewTask {
            file_id,
            priority: 3,
            size: 1000,
            max_retries: 3,
        })
        .await
        .unwrap();

    let task = store.claim_next("dead-worker").await.unwrap().unwrap();
    store
        .update_progress(task.id, 400, Some("/cache/stale.bin.downloading"))
        .await
        .unwrap();

    // With a zero max_age, every in_progress task is considered stale
    // regardless of how recently it was claimed - this is the startup
    // recovery path (`release_stale(0)`).
    let released = store.release_stale(Duration::ZERO).await.unwrap();
    assert_eq!(released, 1);

    let reclaimed = store.claim_next("new-worker").await.unwrap().unwrap();
    assert_eq!(reclaimed.id, task.id);
    assert_eq!(reclaimed.bytes_downloaded, 400);
    assert_eq!(
        reclaimed.temp_file_path.as_deref(),
        Some("/cache/stale.bin.downloading")
    );
}

#[tokio::test]
async fn get_oversized_returns_only_active_tasks_above_the_cap() {
    let store = new_store().await;
    let small_id = insert_file(&store, "small", 10, 3).await;
    let big_id = insert_file(&store, "big", 10_000, 3).await;

    store
        .create(NewTask {
            file_id: small_id,
            priority: 3,
            size: 10,
            max_retries: 3,
        })
        .await
        .unwrap();
    store
        .create(NewTask {
            file_id: big_id,
            priority: 3,
            size: 10_000,
            max_retries: 3,
        })
        .await
        .unwrap();

    let oversized = store.get_oversized(1_000).await.unwrap();
    assert_eq!(oversized.len(), 1);
    assert_eq!(oversized[0].file_id, big_id);
}
