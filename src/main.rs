//! `synodrive-cache` process entry point.
//!
//! Wires together the store, upstream client, metadata synchronizer,
//! download worker pool, maintenance loop, and HTTP share resolver
//! described in `SPEC_FULL.md`, and runs them concurrently until a
//! shutdown signal arrives.

use std::sync::Arc;

use synodrive_cache::cache::{pool, Evictor};
use synodrive_cache::config::Config;
use synodrive_cache::fs_cache::CacheFs;
use synodrive_cache::http::sessions::SessionStore;
use synodrive_cache::http::AppState;
use synodrive_cache::maintenance;
use synodrive_cache::store::{Store, StoreConfig, TaskStore};
use synodrive_cache::sync::Synchronizer;
use synodrive_cache::upstream::client::HttpUpstream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).map(String::as_str);

    let cfg = Config::load(config_path)?;
    synodrive_cache::logging::init(&cfg.logging);

    info!(
        version = synodrive_cache::VERSION,
        name = synodrive_cache::NAME,
        "starting"
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cfg))
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    let cache_fs = CacheFs::new(&cfg.cache.root_dir, cfg.cache.buffer_size_bytes()).await?;

    let store_cfg = StoreConfig {
        path: cfg.database_path(),
        cache_size_mb: cfg.database.cache_size_mb,
        busy_timeout_ms: cfg.database.busy_timeout_ms,
    };
    let store = Store::open(&store_cfg).await?;

    // Recover any in-progress tasks left behind by a previous run before
    // workers or the HTTP server start accepting work.
    let recovered = store.release_stale(std::time::Duration::ZERO).await?;
    if recovered > 0 {
        info!(recovered, "released stale in-progress tasks from previous run");
    }

    let upstream = HttpUpstream::new(
        &cfg.upstream.base_url,
        &cfg.upstream.username,
        &cfg.upstream.password,
        cfg.upstream.skip_tls_verify,
    )?;
    upstream.login().await.map_err(|e| {
        error!(error = %e, "initial upstream login failed");
        e
    })?;

    let cancel = CancellationToken::new();

    let evictor = Evictor::new(
        store.clone(),
        cache_fs.clone(),
        cfg.cache.eviction_interval,
        cfg.cache.eviction_batch_size,
        cfg.cache.max_cache_bytes(),
        cfg.cache.max_disk_usage_percent,
    );

    let worker_cfg = synodrive_cache::cache::WorkerConfig {
        max_cache_bytes: cfg.cache.max_cache_bytes(),
        max_disk_usage_pct: cfg.cache.max_disk_usage_percent,
        progress_update_interval: cfg.cache.progress_update_interval,
    };

    let mut worker_handles = pool::spawn(
        cfg.cache.concurrent_downloads,
        store.clone(),
        upstream.clone(),
        cache_fs.clone(),
        evictor,
        worker_cfg,
        cancel.clone(),
    );

    let synchronizer = Synchronizer::new(store.clone(), upstream.clone(), &cfg);
    let sync_cancel = cancel.clone();
    let sync_handle = tokio::spawn(async move { synchronizer.run(sync_cancel).await });

    let maintenance_cfg = maintenance::MaintenanceConfig {
        stale_task_check_interval: cfg.cache.stale_task_check_interval,
        stale_task_timeout: cfg.cache.stale_task_timeout,
        cleanup_interval: cfg.cache.cleanup_interval,
        failed_task_max_age: cfg.cache.failed_task_max_age,
        temp_file_max_age: cfg.cache.temp_file_max_age,
    };
    let maintenance_store = store.clone();
    let maintenance_fs = cache_fs.clone();
    let maintenance_cancel = cancel.clone();
    let maintenance_handle = tokio::spawn(async move {
        maintenance::run(maintenance_store, maintenance_fs, maintenance_cfg, maintenance_cancel).await
    });

    let app_state = Arc::new(AppState {
        store: store.clone(),
        fs: cache_fs,
        sessions: SessionStore::new(),
    });
    let http_cancel = cancel.clone();
    let http_cfg = cfg.clone();
    let http_handle =
        tokio::spawn(async move { synodrive_cache::http::serve(&http_cfg, app_state, http_cancel).await });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping");
    cancel.cancel();

    if let Err(e) = sync_handle.await {
        error!(error = %e, "synchronizer task panicked");
    }
    if let Err(e) = maintenance_handle.await {
        error!(error = %e, "maintenance task panicked");
    }
    for handle in worker_handles.drain(..) {
        if let Err(e) = handle.await {
            error!(error = %e, "worker task panicked");
        }
    }
    match http_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "http server exited with error"),
        Err(e) => error!(error = %e, "http server task panicked"),
    }

    info!("shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
