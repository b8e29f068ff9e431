//! Resumable download properties from `spec.md` §4.2 / §8: the temp-file
//! append path and the rename-as-commit-point invariant.

use std::io::Cursor;

use synodrive_cache::fs_cache::CacheFs;

#[tokio::test]
async fn fresh_write_creates_final_file_with_full_content() {
    let tmp = tempfile::tempdir().unwrap();
    let fs = CacheFs::new(tmp.path(), 64 * 1024).await.unwrap();

    let content = b"the quick brown fox".to_vec();
    let temp_path = fs.temp_path("dir/file.bin");
    let (final_path, total) = fs
        .write_with_resume("dir/file.bin", Cursor::new(content.clone()), false, &temp_path)
        .await
        .unwrap();

    assert_eq!(total, content.len() as u64);
    assert_eq!(tokio::fs::read(&final_path).await.unwrap(), content);
    // The rename is the commit point: the temp path no longer exists.
    assert!(tokio::fs::metadata(&temp_path).await.is_err());
}

#[tokio::test]
async fn resume_appends_to_existing_temp_and_commits_full_length() {
    let tmp = tempfile::tempdir().unwrap();
    let fs = CacheFs::new(tmp.path(), 64 * 1024).await.unwrap();

    let temp_path = fs.temp_path("resumed.bin");
    let first_half = b"first half of the file ";
    let second_half = b"and the rest of it";

    // Simulate a crash mid-download: write the first half straight to the
    // temp path without going through `write_with_resume` (which would
    // rename it away).
    tokio::fs::create_dir_all(temp_path.parent().unwrap()).await.unwrap();
    tokio::fs::write(&temp_path, first_half).await.unwrap();

    let info = fs.get_temp_info(&temp_path).await.expect("temp info present");
    assert_eq!(info.size, first_half.len() as u64);

    let (final_path, total) = fs
        .write_with_resume("resumed.bin", Cursor::new(second_half.to_vec()), true, &temp_path)
        .await
        .unwrap();

    let mut expected = first_half.to_vec();
    expected.extend_from_slice(second_half);
    assert_eq!(total, expected.len() as u64);
    assert_eq!(tokio::fs::read(&final_path).await.unwrap(), expected);
}

#[tokio::test]
async fn resume_without_existing_temp_falls_back_to_fresh() {
    let tmp = tempfile::tempdir().unwrap();
    let fs = CacheFs::new(tmp.path(), 64 * 1024).await.unwrap();

    // `resume = true` is requested but no temp file exists yet - the
    // adapter must not error, it starts fresh per §4.2.
    let temp_path = fs.temp_path("no-temp-yet.bin");
    let content = b"whole file, no partial".to_vec();
    let (_final_path, total) = fs
        .write_with_resume("no-temp-yet.bin", Cursor::new(content.clone()), true, &temp_path)
        .await
        .unwrap();

    assert_eq!(total, content.len() as u64);
}

#[tokio::test]
async fn clean_old_temp_files_removes_only_aged_temp_files() {
    let tmp = tempfile::tempdir().unwrap();
    let fs = CacheFs::new(tmp.path(), 64 * 1024).await.unwrap();

    let stale_temp = tmp.path().join("stale.bin.downloading");
    let fresh_temp = tmp.path().join("fresh.bin.downloading");
    let final_file = tmp.path().join("done.bin");
    tokio::fs::write(&stale_temp, b"partial").await.unwrap();
    tokio::fs::write(&fresh_temp, b"partial").await.unwrap();
    tokio::fs::write(&final_file, b"complete").await.unwrap();

    // Backdate the "stale" temp file's mtime well past any reasonable
    // min_age so the sweep picks it up deterministically.
    let old_time = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
    filetime_set_mtime(&stale_temp, old_time);

    let removed = fs
        .clean_old_temp_files(std::time::Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert!(tokio::fs::metadata(&stale_temp).await.is_err());
    assert!(tokio::fs::metadata(&fresh_temp).await.is_ok());
    assert!(tokio::fs::metadata(&final_file).await.is_ok());
}

/// Minimal mtime-backdating helper so this test doesn't need a `filetime`
/// dependency: opens the file for write in append mode with a forced
/// utimensat-equivalent via `std::fs::File::set_modified`.
fn filetime_set_mtime(path: &std::path::Path, time: std::time::SystemTime) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
}
