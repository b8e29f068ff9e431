//! Share-token resolver HTTP surface (`spec.md` §4.9, end-to-end scenario
//! 5 and the 503/410/404 status mappings).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::Engine;
use chrono::{Duration as ChronoDuration, Utc};
use synodrive_cache::fs_cache::CacheFs;
use synodrive_cache::http::sessions::SessionStore;
use synodrive_cache::http::{router, AppState};
use synodrive_cache::store::{FileStore, NewFile, NewShare, ShareStore, Store};
use tower::ServiceExt;

async fn build_state() -> (Arc<AppState>, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let store = Store::open_in_memory().await.unwrap();
    let fs = CacheFs::new(tmp.path(), 64 * 1024).await.unwrap();
    let state = Arc::new(AppState {
        store,
        fs,
        sessions: SessionStore::new(),
    });
    (state, tmp)
}

async fn insert_cached_share(
    state: &AppState,
    syno_id: &str,
    token: &str,
    password: Option<&str>,
    expires_at: Option<chrono::DateTime<Utc>>,
) {
    let file = state
        .store
        .insert(NewFile {
            syno_file_id: syno_id.to_string(),
            path: format!("/{syno_id}.txt"),
            size: 5,
            modified_at: None,
            accessed_at: None,
            starred: false,
            shared: true,
            priority: 1,
        })
        .await
        .unwrap();

    let path = state.fs.final_path(&file.path);
    tokio::fs::write(&path, b"hello").await.unwrap();
    state
        .store
        .update_cache_state(file.id, true, &path.to_string_lossy(), 5, Utc::now())
        .await
        .unwrap();

    state
        .store
        .upsert(NewShare {
            token: token.to_string(),
            syno_share_id: format!("share-{syno_id}"),
            file_id: file.id,
            password: password.map(str::to_string),
            expires_at,
            sharing_link: None,
            url: None,
        })
        .await
        .unwrap();
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn basic_header(user: &str, password: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"));
    format!("Basic {encoded}")
}

#[tokio::test]
async fn unknown_token_is_404() {
    let (state, _tmp) = build_state().await;
    let app = router(state);
    let resp = app.oneshot(get("/f/does-not-exist")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn uncached_file_is_503() {
    let (state, _tmp) = build_state().await;
    let file = state
        .store
        .insert(NewFile {
            syno_file_id: "uncached".into(),
            path: "/uncached.bin".into(),
            size: 10,
            modified_at: None,
            accessed_at: None,
            starred: false,
            shared: true,
            priority: 1,
        })
        .await
        .unwrap();
    state
        .store
        .upsert(NewShare {
            token: "tok-uncached".into(),
            syno_share_id: "s-1".into(),
            file_id: file.id,
            password: None,
            expires_at: None,
            sharing_link: None,
            url: None,
        })
        .await
        .unwrap();

    let app = router(state);
    let resp = app.oneshot(get("/f/tok-uncached")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn expired_share_is_410() {
    let (state, _tmp) = build_state().await;
    insert_cached_share(&state, "exp", "tok-exp", None, Some(Utc::now() - ChronoDuration::hours(1))).await;

    let app = router(state);
    let resp = app.oneshot(get("/f/tok-exp")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::GONE);
}

#[tokio::test]
async fn unprotected_cached_share_streams_200() {
    let (state, _tmp) = build_state().await;
    insert_cached_share(&state, "open", "tok-open", None, None).await;

    let app = router(state);
    let resp = app.oneshot(get("/f/tok-open")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"hello");
}

#[tokio::test]
async fn compat_url_shape_ignores_trailing_path() {
    let (state, _tmp) = build_state().await;
    insert_cached_share(&state, "compat", "tok-compat", None, None).await;

    let app = router(state);
    let resp = app
        .oneshot(get("/d/s/tok-compat/whatever/nested/path"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn password_gated_share_full_flow() {
    let (state, _tmp) = build_state().await;
    insert_cached_share(&state, "pw", "tok-pw", Some("secret"), None).await;
    let app = router(state);

    // No credentials -> 401 with WWW-Authenticate.
    let resp = app.clone().oneshot(get("/f/tok-pw")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().get(header::WWW_AUTHENTICATE).is_some());

    // Wrong password -> 403.
    let req = Request::builder()
        .uri("/f/tok-pw")
        .header(header::AUTHORIZATION, basic_header("user", "wrong"))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Correct password -> 200 + Set-Cookie.
    let req = Request::builder()
        .uri("/f/tok-pw")
        .header(header::AUTHORIZATION, basic_header("user", "secret"))
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let set_cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .expect("Set-Cookie header present")
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("share_session="));
    assert!(set_cookie.contains("HttpOnly"));

    let cookie_value = set_cookie.split(';').next().unwrap();

    // Cookie alone, no Basic credentials -> 200.
    let req = Request::builder()
        .uri("/f/tok-pw")
        .header(header::COOKIE, cookie_value)
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let (state, _tmp) = build_state().await;
    let app = router(state);
    let resp = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
