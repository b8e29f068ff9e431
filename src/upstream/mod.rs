//! Semantic operations against the remote document service.
//!
//! `spec.md` §4.3 scopes this module to the operations the core actually
//! consumes — full control-plane JSON encoding is out of scope. The
//! [`UpstreamClient`] trait is the seam: the synchronizer and workers code
//! against it, the real implementation lives in [`client::HttpUpstream`],
//! and tests substitute [`client::MockUpstream`] (or any other in-crate
//! fake), the same trait-for-testability pattern as the teacher's
//! `enterprise/cache/strategy.rs` `BackingStore` trait.

pub mod client;
pub mod session;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
pub use types::{DownloadStream, DriveFile, Label, ListSort, Page, SharingInfo};

/// The semantic surface the metadata synchronizer and download workers
/// need from the upstream service. Implementations MUST be safe to call
/// from many concurrent tasks.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Files shared with others, paginated.
    async fn get_shared_files(&self, offset: u32, limit: u32) -> Result<Page<DriveFile>>;
    /// Starred files, paginated.
    async fn get_starred_files(&self, offset: u32, limit: u32) -> Result<Page<DriveFile>>;
    /// Files under a given label, paginated.
    async fn get_labeled_files(
        &self,
        label_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Page<DriveFile>>;
    /// Recently modified files, paginated.
    async fn get_recent_files(&self, offset: u32, limit: u32) -> Result<Page<DriveFile>>;

    /// Directory listing, for the recursive scanner.
    async fn list_files(
        &self,
        path: &str,
        offset: u32,
        limit: u32,
        sort: Option<ListSort>,
    ) -> Result<Page<DriveFile>>;

    /// All labels known upstream.
    async fn get_labels(&self) -> Result<Vec<Label>>;

    /// Download from the start of the file.
    async fn download_file(&self, path: &str) -> Result<DownloadStream>;
    /// Ranged download starting at `start`. Implementations must accept
    /// both `200` and `206` responses from upstream.
    async fn download_file_with_range(&self, path: &str, start: u64) -> Result<DownloadStream>;

    /// Advance-sharing metadata for a file, by upstream id or path.
    async fn get_advance_sharing(&self, file_id_or_path: &str) -> Result<SharingInfo>;

    /// Acquire a session. Implementations retry once on session-expired
    /// responses for every other method in this trait; callers never see
    /// that retry.
    async fn login(&self) -> Result<()>;
    /// Release the current session.
    async fn logout(&self) -> Result<()>;
}
