//! Single-flighted session state: many callers may see a session-expired
//! response at once, but only one of them should actually re-login.
//!
//! Modeled the way the teacher single-flights Redis reconnects in
//! `database/connection_pool.rs` — a `Mutex`-guarded slot holding the
//! current token, plus an `Option` of the in-flight re-login future so
//! concurrent callers await the same attempt instead of hammering the
//! upstream login endpoint.

use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

use crate::error::{Error, Result};

/// Current session token, if logged in.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub sid: Option<String>,
}

/// Guards [`SessionState`] and ensures at most one re-login attempt is ever
/// in flight at a time.
pub struct SessionGuard {
    state: Mutex<SessionState>,
    relogin_gate: Semaphore,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            relogin_gate: Semaphore::new(1),
        }
    }

    /// The current session id, if any.
    pub async fn current(&self) -> Option<String> {
        self.state.lock().await.sid.clone()
    }

    /// Replace the current session id (called after a successful login).
    pub async fn set(&self, sid: String) {
        self.state.lock().await.sid = Some(sid);
    }

    pub async fn clear(&self) {
        self.state.lock().await.sid = None;
    }

    /// Run `login` with single-flight semantics: if another caller is
    /// already re-logging in, this one waits for the permit and then
    /// re-checks whether a session has since appeared before trying again
    /// itself. `stale_sid` is the session id the caller observed failing
    /// with session-expired; it is only trusted as "already fixed" if the
    /// current slot holds something *different* from it, otherwise the
    /// slot is cleared and a fresh login is performed.
    pub async fn relogin_single_flight<F, Fut>(
        self: &Arc<Self>,
        stale_sid: &str,
        login: F,
    ) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<String>>,
    {
        let _permit = self
            .relogin_gate
            .acquire()
            .await
            .map_err(|e| Error::Other(format!("relogin semaphore closed: {e}")))?;

        // Someone else may have refreshed the session while we waited for
        // the permit. Only trust it if it's not the same sid we already
        // know is expired.
        if let Some(sid) = self.current().await {
            if sid != stale_sid {
                return Ok(sid);
            }
        }

        self.clear().await;
        let sid = login().await?;
        self.set(sid.clone()).await;
        Ok(sid)
    }
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn relogin_clears_and_retries_when_current_sid_is_still_the_stale_one() {
        let guard = Arc::new(SessionGuard::new());
        guard.set("expired-sid".to_string()).await;
        let login_calls = AtomicU32::new(0);

        let new_sid = guard
            .relogin_single_flight("expired-sid", || async {
                login_calls.fetch_add(1, Ordering::SeqCst);
                Ok("fresh-sid".to_string())
            })
            .await
            .unwrap();

        assert_eq!(new_sid, "fresh-sid");
        assert_eq!(login_calls.load(Ordering::SeqCst), 1);
        assert_eq!(guard.current().await.as_deref(), Some("fresh-sid"));
    }

    #[tokio::test]
    async fn relogin_skips_login_when_another_caller_already_refreshed_it() {
        let guard = Arc::new(SessionGuard::new());
        guard.set("already-fresh-sid".to_string()).await;
        let login_calls = AtomicU32::new(0);

        let sid = guard
            .relogin_single_flight("stale-sid-someone-else-saw", || async {
                login_calls.fetch_add(1, Ordering::SeqCst);
                Ok("should-not-be-used".to_string())
            })
            .await
            .unwrap();

        assert_eq!(sid, "already-fresh-sid");
        assert_eq!(login_calls.load(Ordering::SeqCst), 0);
    }
}
