//! OAuth state token store for CSRF protection.
//!
//! Issues single-use, time-bounded state tokens that bind an authorization
//! request to its callback. Tokens live in memory only: a restart simply
//! invalidates all in-flight installs.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory state token store with automatic expiration.
///
/// Cheap to clone; clones share the same underlying map.
#[derive(Clone)]
pub struct StateStore {
    states: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
    ttl: Duration,
}

impl StateStore {
    /// Create a store whose tokens expire `ttl_seconds` after issuance.
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Issue a new state token and record its expiration instant.
    ///
    /// Tokens are 32 hex chars (128 bits from the thread RNG).
    pub fn issue(&self) -> String {
        let token = generate_state_token();
        let expires_at = Utc::now() + self.ttl;

        let mut states = self.states.lock().unwrap();
        states.insert(token.clone(), expires_at);

        token
    }

    /// Validate and consume a state token.
    ///
    /// The token is removed unconditionally (single-use, even when expired),
    /// so a second consume of the same token always fails. Returns true only
    /// if the token was present and the current time is still before its
    /// expiration instant. Removal and expiry check happen under one lock
    /// acquisition, so two concurrent consumes cannot both succeed.
    pub fn consume(&self, token: &str) -> bool {
        let mut states = self.states.lock().unwrap();

        match states.remove(token) {
            Some(expires_at) => Utc::now() < expires_at,
            None => false,
        }
    }

    /// Drop expired tokens that were never consumed.
    pub fn cleanup_expired(&self) {
        let mut states = self.states.lock().unwrap();
        let now = Utc::now();

        states.retain(|_, expires_at| now < *expires_at);
    }

    /// Number of outstanding tokens (for monitoring).
    pub fn count(&self) -> usize {
        self.states.lock().unwrap().len()
    }
}

/// Generate a state token: 32 lowercase hex chars (128 bits of entropy).
fn generate_state_token() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let idx: u8 = rng.gen_range(0..16);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}

/// Background task to periodically sweep expired state tokens.
pub async fn run_state_cleanup(store: StateStore, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        store.cleanup_expired();
        tracing::debug!(
            "OAuth state cleanup complete, {} tokens outstanding",
            store.count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_consume() {
        let store = StateStore::new(300);

        let token = store.issue();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        assert!(store.consume(&token));
    }

    #[test]
    fn test_token_is_single_use() {
        let store = StateStore::new(300);

        let token = store.issue();

        // First consume succeeds
        assert!(store.consume(&token));

        // Second consume fails (already removed)
        assert!(!store.consume(&token));
    }

    #[test]
    fn test_unknown_token_rejected() {
        let store = StateStore::new(300);

        assert!(!store.consume("never_issued"));
    }

    #[test]
    fn test_expired_token_rejected_and_removed() {
        // Zero TTL: expires_at == issuance instant, so consume is late
        let store = StateStore::new(0);

        let token = store.issue();
        assert_eq!(store.count(), 1);

        // Expired consume reports false but still removes the token
        assert!(!store.consume(&token));
        assert_eq!(store.count(), 0);
        assert!(!store.consume(&token));
    }

    #[test]
    fn test_cleanup_removes_expired() {
        let store = StateStore::new(0);

        store.issue();
        store.issue();
        assert_eq!(store.count(), 2);

        store.cleanup_expired();
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_cleanup_keeps_live_tokens() {
        let store = StateStore::new(300);

        let token = store.issue();
        store.cleanup_expired();

        assert_eq!(store.count(), 1);
        assert!(store.consume(&token));
    }

    #[test]
    fn test_concurrent_issue_and_consume() {
        let store = StateStore::new(300);

        // Issue N tokens from parallel threads, then consume each exactly
        // once in parallel: exactly N successes, zero collisions.
        let issued: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let store = store.clone();
                    s.spawn(move || store.issue())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(store.count(), 16);

        let successes: usize = std::thread::scope(|s| {
            let handles: Vec<_> = issued
                .iter()
                .map(|token| {
                    let store = store.clone();
                    s.spawn(move || store.consume(token))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });

        assert_eq!(successes, 16);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_double_consume_race_single_winner() {
        let store = StateStore::new(300);
        let token = store.issue();

        let successes: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = store.clone();
                    let token = token.clone();
                    s.spawn(move || store.consume(&token))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });

        assert_eq!(successes, 1);
    }
}
