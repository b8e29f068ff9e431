//! Share-token resolver (`spec.md` §4.9): the read path that maps a token
//! to cached file bytes, gated by password/session.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use tokio_util::io::ReaderStream;
use tracing::warn;

use super::sessions::SESSION_TTL;
use super::AppState;
use crate::models::FileWithShare;
use crate::store::ShareStore;

/// Cookie name carrying the share session id.
pub const SESSION_COOKIE: &str = "share_session";

/// Reasons the resolver refuses to serve a token, mapped to the status
/// codes in `spec.md` §6/§4.9. Never carries upstream or storage detail —
/// `Display` messages here are the only thing a client ever sees.
enum ShareError {
    NotFound,
    Gone,
    AuthRequired,
    Forbidden,
    NotCached,
    Internal(crate::error::Error),
}

impl IntoResponse for ShareError {
    fn into_response(self) -> Response {
        match self {
            ShareError::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),
            ShareError::Gone => (StatusCode::GONE, "share revoked or expired").into_response(),
            ShareError::AuthRequired => {
                let mut resp = (StatusCode::UNAUTHORIZED, "password required").into_response();
                resp.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    header::HeaderValue::from_static("Basic realm=\"synodrive share\""),
                );
                resp
            }
            ShareError::Forbidden => (StatusCode::FORBIDDEN, "invalid password").into_response(),
            ShareError::NotCached => {
                (StatusCode::SERVICE_UNAVAILABLE, "file not cached").into_response()
            }
            ShareError::Internal(e) => {
                warn!(error = %e, "share resolver internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

impl From<crate::error::Error> for ShareError {
    fn from(e: crate::error::Error) -> Self {
        ShareError::Internal(e)
    }
}

/// `GET /f/:token`.
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    resolve_inner(state, token, headers, jar).await
}

/// `GET /d/s/:token/*rest` — the upstream-compatibility URL shape; the
/// trailing path is ignored.
pub async fn resolve_compat(
    State(state): State<Arc<AppState>>,
    Path((token, _rest)): Path<(String, String)>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    resolve_inner(state, token, headers, jar).await
}

async fn resolve_inner(
    state: Arc<AppState>,
    token: String,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    match do_resolve(&state, &token, &headers, &jar).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn do_resolve(
    state: &Arc<AppState>,
    token: &str,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> Result<Response, ShareError> {
    let FileWithShare { file, share } = state
        .store
        .get_file_by_share_token(token)
        .await?
        .ok_or(ShareError::NotFound)?;

    if !share.is_active(chrono::Utc::now()) {
        return Err(ShareError::Gone);
    }

    let mut set_cookie: Option<Cookie<'static>> = None;

    if share.has_password() {
        let cookie_ok = jar
            .get(SESSION_COOKIE)
            .is_some_and(|c| state.sessions.authorizes(c.value(), token));

        if !cookie_ok {
            match basic_auth_password(headers) {
                Some(provided) => {
                    let expected = share.password.as_deref().unwrap_or("");
                    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
                        return Err(ShareError::Forbidden);
                    }
                    let session_id = state.sessions.create(token);
                    set_cookie = Some(
                        Cookie::build((SESSION_COOKIE, session_id))
                            .http_only(true)
                            .same_site(SameSite::Strict)
                            .max_age(time::Duration::seconds(SESSION_TTL.num_seconds()))
                            .path("/")
                            .build(),
                    );
                }
                None => return Err(ShareError::AuthRequired),
            }
        }
    }

    if !file.cached || file.cache_path.is_empty() {
        return Err(ShareError::NotCached);
    }

    let handle = state
        .fs
        .open(&file.cache_path)
        .await
        .map_err(ShareError::Internal)?;
    let metadata = handle.metadata().await.map_err(|e| ShareError::Internal(e.into()))?;

    let basename = file
        .path
        .rsplit('/')
        .next()
        .unwrap_or(file.path.as_str())
        .to_string();
    let content_type = guess_content_type(&basename);

    let body = Body::from_stream(ReaderStream::new(handle));
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{basename}\""),
        )
        .body(body)
        .map_err(|e| ShareError::Internal(crate::error::Error::Other(e.to_string())))?;

    if let Some(cookie) = set_cookie {
        if let Ok(value) = header::HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    let store = state.store.clone();
    let file_id = file.id;
    tokio::spawn(async move {
        if let Err(e) = crate::store::FileStore::touch_access(&store, file_id).await {
            warn!(file_id, error = %e, "failed to touch last_access_in_cache_at");
        }
    });

    Ok(response)
}

fn basic_auth_password(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (_user, password) = text.split_once(':')?;
    Some(password.to_string())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    ring::constant_time::verify_slices_are_equal(a, b).is_ok()
}

/// Minimal extension → MIME lookup. Unrecognized extensions fall back to
/// `application/octet-stream`, which is always a safe default for a raw
/// file download.
fn guess_content_type(basename: &str) -> &'static str {
    let ext = basename.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "json" => "application/json",
        "zip" => "application/zip",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        _ => "application/octet-stream",
    }
}
