//! `GET /debug/stats` and `GET /debug/files` (`spec.md` §6).

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::json;

use super::AppState;
use crate::store::{FileStore, ShareStore};

/// Bound on how many "next to cache" rows `/debug/files` returns.
const DEBUG_FILES_LIMIT: i64 = 200;

#[derive(Serialize)]
struct Stats {
    total_files: i64,
    cached_files: i64,
    cached_size_bytes: i64,
    active_shares: i64,
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let file_stats = state
        .store
        .stats()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let active_shares = state
        .store
        .count_active()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(json!(Stats {
        total_files: file_stats.total_files,
        cached_files: file_stats.cached_files,
        cached_size_bytes: file_stats.cached_size_bytes,
        active_shares,
    })))
}

pub async fn files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let next = state
        .store
        .next_to_cache(DEBUG_FILES_LIMIT)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let file_stats = state
        .store
        .stats()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(json!({
        "next_to_cache": next,
        "stats": file_stats,
    })))
}
