//! Filesystem adapter: cache-root I/O, temp-file lifecycle, and the
//! disk-usage probe entry point (the actual platform-specific syscalls live
//! in `src/cache/disk_usage.rs`).
//!
//! The cache directory mirrors the upstream path hierarchy: a file at
//! upstream path `foo/bar.bin` lives at `<root>/foo/bar.bin`. In-flight
//! downloads are written to `<final path>.downloading` and renamed into
//! place on success — the rename is the single commit point a reader can
//! trust.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File as TokioFile, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter};

use crate::error::Result;

/// Suffix appended to a file's final path while it's still downloading.
pub const TEMP_SUFFIX: &str = ".downloading";

/// Default buffered-copy chunk size, overridable via
/// `Config::cache::buffer_size_mb`.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// Rooted cache directory handle.
#[derive(Clone)]
pub struct CacheFs {
    root: PathBuf,
    buffer_size: usize,
}

/// Size and modification time of a temp file, or absence (not an error —
/// callers treat it as "start fresh").
#[derive(Debug, Clone, Copy)]
pub struct TempInfo {
    pub size: u64,
    pub modified: std::time::SystemTime,
}

impl CacheFs {
    /// Create an adapter rooted at `root`, creating the directory if it
    /// doesn't exist.
    pub async fn new(root: impl Into<PathBuf>, buffer_size: usize) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            buffer_size: buffer_size.max(64 * 1024),
        })
    }

    /// The final on-disk path for an upstream path.
    pub fn final_path(&self, upstream_path: &str) -> PathBuf {
        self.root.join(upstream_path.trim_start_matches('/'))
    }

    /// The temp path for an upstream path (`<final path>.downloading`).
    pub fn temp_path(&self, upstream_path: &str) -> PathBuf {
        let mut path = self.final_path(upstream_path).into_os_string();
        path.push(TEMP_SUFFIX);
        PathBuf::from(path)
    }

    /// Stream `reader` to `temp_path`, then atomically rename it to the
    /// final path for `upstream_path`. When `resume` is true and
    /// `temp_path` already exists, bytes are appended to it (the caller is
    /// expected to have already sought the upstream reader to the matching
    /// offset); otherwise the temp file is created/truncated fresh.
    ///
    /// Returns the final path and the total number of bytes now on disk at
    /// that path.
    pub async fn write_with_resume<R>(
        &self,
        upstream_path: &str,
        mut reader: R,
        resume: bool,
        temp_path: &Path,
    ) -> Result<(PathBuf, u64)>
    where
        R: AsyncRead + Unpin,
    {
        let final_path = self.final_path(upstream_path);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let resume = resume && fs::metadata(temp_path).await.is_ok();

        let file = OpenOptions::new()
            .create(true)
            .append(resume)
            .write(true)
            .truncate(!resume)
            .open(temp_path)
            .await?;

        let mut writer = BufWriter::with_capacity(self.buffer_size, file);
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
        }
        writer.flush().await?;
        drop(writer);

        let total_bytes = fs::metadata(temp_path).await?.len();
        fs::rename(temp_path, &final_path).await?;

        Ok((final_path, total_bytes))
    }

    /// Size and mtime of a temp file, or `None` if it doesn't exist.
    pub async fn get_temp_info(&self, temp_path: &Path) -> Option<TempInfo> {
        let meta = fs::metadata(temp_path).await.ok()?;
        Some(TempInfo {
            size: meta.len(),
            modified: meta.modified().ok()?,
        })
    }

    /// Delete a temp file if it exists. Absence is not an error.
    pub async fn remove_temp(&self, temp_path: &Path) -> Result<()> {
        match fs::remove_file(temp_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the final cached file for an upstream path, if it exists.
    pub async fn remove_cached(&self, cache_path: &str) -> Result<()> {
        match fs::remove_file(cache_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Walk the cache root and sum the size of every regular file,
    /// including in-flight temp files (they occupy real disk space).
    pub async fn get_cache_size(&self) -> Result<u64> {
        let mut total = 0u64;
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    stack.push(entry.path());
                } else if meta.is_file() {
                    total += meta.len();
                }
            }
        }
        Ok(total)
    }

    /// Walk the tree and remove temp files (names ending in
    /// [`TEMP_SUFFIX`]) whose mtime is older than `min_age`. Returns the
    /// number removed.
    pub async fn clean_old_temp_files(&self, min_age: std::time::Duration) -> Result<u64> {
        let cutoff = std::time::SystemTime::now()
            .checked_sub(min_age)
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);

        let mut removed = 0u64;
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    stack.push(path);
                    continue;
                }
                let is_temp = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(TEMP_SUFFIX));
                if !is_temp {
                    continue;
                }
                let modified = meta.modified().unwrap_or(std::time::SystemTime::now());
                if modified < cutoff {
                    if fs::remove_file(&path).await.is_ok() {
                        removed += 1;
                    }
                }
            }
        }
        Ok(removed)
    }

    /// Open a cached file for streaming to an HTTP client.
    pub async fn open(&self, cache_path: &str) -> Result<TokioFile> {
        Ok(TokioFile::open(cache_path).await?)
    }

    /// The root directory this adapter is rooted at.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
