//! # synodrive-cache
//!
//! An offline-tolerant local cache and share-token read path for a remote
//! document service.
//!
//! ## Architecture
//!
//! - `config`: layered TOML + env configuration
//! - `error`: crate-wide error type
//! - `logging`: `tracing` subscriber setup
//! - `models`: domain entities (`File`, `Share`, `DownloadTask`) and their
//!   state machines
//! - `store`: transactional SQLite persistence (`FileStore`, `ShareStore`,
//!   `TaskStore`)
//! - `fs_cache`: cache-root filesystem adapter and disk-usage probe entry
//!   point
//! - `upstream`: the remote document service client (`UpstreamClient`) and
//!   its session/re-login handling
//! - `sync`: the metadata synchronizer that walks the upstream tree and
//!   classifies files
//! - `queue`: thin façade over the download task queue
//! - `cache`: the download worker pool, admission control, and eviction
//! - `maintenance`: periodic stale-task release and temp-file sweep
//! - `http`: the share-token resolver HTTP surface

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Layered TOML + env configuration.
pub mod config;
/// Crate-wide error type.
pub mod error;
/// `tracing` subscriber setup.
pub mod logging;
/// Domain entities and their state machines.
pub mod models;

/// Transactional SQLite persistence.
pub mod store;

/// Cache-root filesystem adapter and disk-usage probe entry point.
pub mod fs_cache;

/// Upstream document-service client and session handling.
pub mod upstream;

/// Metadata synchronizer.
pub mod sync;

/// Download task queue façade.
pub mod queue;

/// Download worker pool, admission control, and eviction.
pub mod cache;

/// Periodic stale-task release and temp-file sweep.
pub mod maintenance;

/// Share-token resolver HTTP surface.
pub mod http;

pub use error::{Error, Result};
pub use models::{DownloadTask, File, Priority, Share, TaskStatus};

/// Crate version, as set in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, as set in `Cargo.toml`.
pub const NAME: &str = env!("CARGO_PKG_NAME");
