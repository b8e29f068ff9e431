//! Wire-format DTOs for the upstream control API, and the mapped types that
//! cross the module boundary.
//!
//! Only [`DriveFile`], [`Label`], and [`SharingInfo`] are public; the raw
//! JSON envelopes stay private to [`super::client`], mirroring how the
//! teacher's `io` parsers keep their wire structs out of the public API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One file or directory as reported by any of the listing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub path: String,
    pub is_dir: bool,
    pub size: i64,
    pub mtime: Option<DateTime<Utc>>,
    pub atime: Option<DateTime<Utc>>,
    pub starred: bool,
    pub shared: bool,
    pub permanent_link: Option<String>,
    pub labels: Vec<String>,
}

/// A label as returned by `get_labels`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// Advance-sharing metadata for a file, as returned by
/// `get_advance_sharing`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SharingInfo {
    pub sharing_link: Option<String>,
    pub url: Option<String>,
    pub protect_password: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

/// A page of listing results: the total count upstream reports (for
/// pagination bookkeeping) plus the items in this page.
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub total: u64,
    pub items: Vec<T>,
}

/// Sort order accepted by `list_files`; upstream default is used when
/// `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSort {
    NameAsc,
    MtimeDesc,
}

/// A byte stream plus the content-length upstream reported for it.
pub struct DownloadStream {
    pub content_length: u64,
    pub reader: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
    /// `true` when upstream answered `206 Partial Content`.
    pub partial: bool,
}
