//! Share-token resolver HTTP surface (`spec.md` §4.9, §6).

pub mod debug;
pub mod health;
pub mod middleware;
pub mod share;
pub mod sessions;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::fs_cache::CacheFs;
use crate::store::Store;
use sessions::SessionStore;

/// Shared state handed to every handler.
pub struct AppState {
    pub store: Store,
    pub fs: CacheFs,
    pub sessions: SessionStore,
}

/// Build the router: `/health`, `/f/:token`, `/d/s/:token/*rest`,
/// `/debug/stats`, `/debug/files`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/f/:token", get(share::resolve))
        .route("/d/s/:token/*rest", get(share::resolve_compat))
        .route("/debug/stats", get(debug::stats))
        .route("/debug/files", get(debug::files))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router on `cfg.http.bind_addr` until `cancel` fires, then
/// drain in-flight connections for up to `cfg.http.shutdown_timeout`
/// before forcing the listener down.
pub async fn serve(cfg: &Config, state: Arc<AppState>, cancel: CancellationToken) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.http.bind_addr).await?;
    info!(addr = %cfg.http.bind_addr, "http server listening");

    let shutdown_signal = cancel.clone();
    let serving = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal.cancelled().await;
        info!("http server starting graceful shutdown");
    });

    let shutdown_timeout = cfg.http.shutdown_timeout;
    tokio::select! {
        result = serving => result,
        _ = async move {
            cancel.cancelled().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            info!("graceful shutdown window elapsed, forcing http server down");
            Ok(())
        }
    }
}
