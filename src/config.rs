//! Typed configuration tree, loader, and validation.
//!
//! Loaded from (lowest to highest precedence): built-in defaults, an
//! optional TOML file, then `SYNODRIVE_*` environment variable overrides.
//! Durations are written in config as human strings (`"30s"`, `"1h"`) via
//! `humantime_serde`, so a value that doesn't parse fails deserialization
//! instead of silently falling back to a default.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Root configuration object.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote document service connection settings.
    pub upstream: UpstreamConfig,
    /// Local cache behavior.
    pub cache: CacheConfig,
    /// Metadata synchronizer behavior.
    pub sync: SyncConfig,
    /// HTTP server settings.
    pub http: HttpConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Database settings.
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
            sync: SyncConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub skip_tls_verify: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            skip_tls_verify: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub root_dir: PathBuf,
    pub max_size_gb: f64,
    pub max_disk_usage_percent: f64,
    pub recent_modified_days: u32,
    pub recent_accessed_days: u32,
    pub concurrent_downloads: usize,
    #[serde(with = "humantime_serde")]
    pub eviction_interval: Duration,
    pub buffer_size_mb: usize,
    #[serde(with = "humantime_serde")]
    pub stale_task_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub progress_update_interval: Duration,
    pub max_download_retries: u32,
    pub eviction_batch_size: usize,
    #[serde(with = "humantime_serde")]
    pub stale_task_check_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub failed_task_max_age: Duration,
    #[serde(with = "humantime_serde")]
    pub temp_file_max_age: Duration,
}

impl CacheConfig {
    /// `max_size_gb` converted to bytes.
    pub fn max_cache_bytes(&self) -> u64 {
        (self.max_size_gb * 1024.0 * 1024.0 * 1024.0) as u64
    }

    /// `buffer_size_mb` converted to bytes.
    pub fn buffer_size_bytes(&self) -> usize {
        self.buffer_size_mb * 1024 * 1024
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./cache"),
            max_size_gb: 50.0,
            max_disk_usage_percent: 90.0,
            recent_modified_days: 7,
            recent_accessed_days: 30,
            concurrent_downloads: 3,
            eviction_interval: Duration::from_secs(30),
            buffer_size_mb: 8,
            stale_task_timeout: Duration::from_secs(30 * 60),
            progress_update_interval: Duration::from_secs(10),
            max_download_retries: 3,
            eviction_batch_size: 10,
            stale_task_check_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(60 * 60),
            failed_task_max_age: Duration::from_secs(24 * 60 * 60),
            temp_file_max_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    #[serde(with = "humantime_serde")]
    pub full_scan_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub incremental_interval: Duration,
    pub page_size: u32,
    pub exclude_labels: Vec<String>,
    pub max_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            full_scan_interval: Duration::from_secs(60 * 60),
            incremental_interval: Duration::from_secs(60),
            page_size: 100,
            exclude_labels: Vec::new(),
            max_concurrency: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub admin_username: String,
    pub admin_password: String,
    pub enable_admin_browser: bool,
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            admin_username: String::new(),
            admin_password: String::new(),
            enable_admin_browser: false,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Explicit database path. Defaults to `<cache.root_dir>/synodrive.db`
    /// when empty.
    pub path: PathBuf,
    pub cache_size_mb: i64,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            cache_size_mb: 64,
            busy_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus `SYNODRIVE_*`
    /// environment overrides, then validate it.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SYNODRIVE")
                .separator("_")
                .try_parsing(true),
        );

        let raw = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build configuration: {e}")))?;

        let cfg: Config = raw
            .try_deserialize()
            .map_err(|e| Error::Config(format!("failed to parse configuration: {e}")))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validation rules from the configuration contract: reject empty
    /// required fields, out-of-range percentages, and nonsensical values.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.base_url.trim().is_empty() {
            return Err(Error::Config("upstream.base_url must not be empty".into()));
        }
        if self.upstream.username.trim().is_empty() {
            return Err(Error::Config("upstream.username must not be empty".into()));
        }
        if !(1.0..=100.0).contains(&self.cache.max_disk_usage_percent) {
            return Err(Error::Config(
                "cache.max_disk_usage_percent must be in [1, 100]".into(),
            ));
        }
        if self.cache.max_size_gb <= 0.0 {
            return Err(Error::Config("cache.max_size_gb must be positive".into()));
        }
        if self.cache.concurrent_downloads == 0 {
            return Err(Error::Config(
                "cache.concurrent_downloads must be at least 1".into(),
            ));
        }
        if self.cache.root_dir.as_os_str().is_empty() {
            return Err(Error::Config("cache.root_dir must not be empty".into()));
        }
        if self.http.bind_addr.trim().is_empty() {
            return Err(Error::Config("http.bind_addr must not be empty".into()));
        }
        Ok(())
    }

    /// Resolved database path: the explicit `database.path` if set,
    /// otherwise `<cache.root_dir>/synodrive.db`.
    pub fn database_path(&self) -> PathBuf {
        if self.database.path.as_os_str().is_empty() {
            self.cache.root_dir.join("synodrive.db")
        } else {
            self.database.path.clone()
        }
    }
}
