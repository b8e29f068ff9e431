//! Tracing subscriber setup.
//!
//! One-shot initialization called once from `main.rs` before anything else
//! runs, following the teacher's `main.rs` logging-banner convention but
//! using `tracing`/`tracing-subscriber` instead of `log`/`env_logger`.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the global tracing subscriber from the logging configuration.
/// Safe to call exactly once; a second call is a logic error in the caller,
/// not something this function guards against.
pub fn init(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.level.as_str()));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match cfg.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}
