//! Process-local duplicate-action lock.
//!
//! Collapses a cron timer firing and a reconciliation tick that land in the
//! same window onto a single execution. Cross-replica exclusion is the leader
//! coordinator's job, not this lock's.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::models::ActionKey;

/// Map size at which claims start sweeping out expired entries.
const PRUNE_THRESHOLD: usize = 512;

pub struct DuplicateActionLock {
    window: chrono::Duration,
    claims: Mutex<HashMap<ActionKey, DateTime<Utc>>>,
}

impl DuplicateActionLock {
    pub fn new(window: Duration) -> Self {
        Self {
            window: chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::seconds(60)),
            claims: Mutex::new(HashMap::new()),
        }
    }

    pub fn try_claim(&self, key: &ActionKey) -> bool {
        self.try_claim_at(key, Utc::now())
    }

    /// Claim `key` unless it was claimed less than one window ago. A rejected
    /// claim leaves the earlier timestamp untouched.
    pub fn try_claim_at(&self, key: &ActionKey, now: DateTime<Utc>) -> bool {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(prev) = claims.get(key) {
            if now - *prev < self.window {
                return false;
            }
        }

        if claims.len() >= PRUNE_THRESHOLD {
            let window = self.window;
            claims.retain(|_, at| now - *at < window);
        }

        claims.insert(key.clone(), now);
        true
    }

    /// Whether a claim on `key` is still inside the window.
    pub fn is_held_at(&self, key: &ActionKey, now: DateTime<Utc>) -> bool {
        let claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims.get(key).is_some_and(|prev| now - *prev < self.window)
    }

    pub fn len(&self) -> usize {
        self.claims.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
