//! In-process session map for password-gated shares (`spec.md` §4.9):
//! random id → `{token, expires_at}`, guarded by a reader-writer lock.
//! Sessions don't survive a restart — clients simply re-authenticate via
//! Basic, per the Design Notes §9 call.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::RngCore;

/// Entries beyond this count trigger an expiry sweep on the next insert.
const SWEEP_THRESHOLD: usize = 1000;

/// 24-hour session TTL, per `spec.md` §4.9 / §6's cookie `Max-Age`.
pub const SESSION_TTL: chrono::Duration = chrono::Duration::hours(24);

#[derive(Debug, Clone)]
struct SessionEntry {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Guards the session map. Cheap to clone (an `Arc` internally via
/// `parking_lot::RwLock` held behind an `Arc` in [`super::AppState`]).
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new session for `token`, returning the session id to set as
    /// the cookie value.
    pub fn create(&self, token: &str) -> String {
        let id = random_session_id();
        let entry = SessionEntry {
            token: token.to_string(),
            expires_at: Utc::now() + SESSION_TTL,
        };

        let mut guard = self.sessions.write();
        if guard.len() >= SWEEP_THRESHOLD {
            let now = Utc::now();
            guard.retain(|_, e| e.expires_at > now);
        }
        guard.insert(id.clone(), entry);
        id
    }

    /// Whether `session_id` is a live, unexpired session that authorizes
    /// `token`.
    pub fn authorizes(&self, session_id: &str, token: &str) -> bool {
        let guard = self.sessions.read();
        match guard.get(session_id) {
            Some(entry) => entry.token == token && entry.expires_at > Utc::now(),
            None => false,
        }
    }
}

/// 128+ bits of randomness, hex-encoded.
fn random_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
