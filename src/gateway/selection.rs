//! Pending leg selections for the two-step "pick a leg, then pick an
//! outcome" flow.
//!
//! A selection is keyed by (user, parlay), replaces any earlier pick for
//! the same key, and lapses after the configured timeout. A selection is
//! only consumed once its outcome has been applied.

use chrono::Duration;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::{ParlayError, ParlayId, Timestamp, UserId};

#[derive(Debug, Clone, Copy)]
struct Pending {
    leg_index: usize,
    expires_at: Timestamp,
}

pub struct PendingSelections {
    timeout: Duration,
    entries: Mutex<HashMap<(UserId, ParlayId), Pending>>,
}

impl PendingSelections {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Remember `leg_index` for (user, parlay) until `now + timeout`.
    pub async fn pick(&self, user_id: &str, parlay_id: &str, leg_index: usize, now: &Timestamp) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, p| p.expires_at > *now);
        entries.insert(
            (user_id.to_string(), parlay_id.to_string()),
            Pending {
                leg_index,
                expires_at: *now + self.timeout,
            },
        );
    }

    /// The pending leg for (user, parlay), left in place. An expired entry
    /// is dropped.
    pub async fn peek(&self, user_id: &str, parlay_id: &str, now: &Timestamp) -> Result<usize, ParlayError> {
        let key = (user_id.to_string(), parlay_id.to_string());
        let mut entries = self.entries.lock().await;
        match entries.get(&key).copied() {
            Some(p) if p.expires_at > *now => Ok(p.leg_index),
            Some(_) => {
                entries.remove(&key);
                debug!(user_id, parlay_id, "Leg selection expired");
                Err(ParlayError::SelectionExpired)
            }
            None => Err(ParlayError::SelectionExpired),
        }
    }

    /// Remove the selection for (user, parlay) if it still points at
    /// `leg_index`. A newer pick for another leg is kept.
    pub async fn consume(&self, user_id: &str, parlay_id: &str, leg_index: usize) -> bool {
        let key = (user_id.to_string(), parlay_id.to_string());
        let mut entries = self.entries.lock().await;
        match entries.get(&key) {
            Some(p) if p.leg_index == leg_index => entries.remove(&key).is_some(),
            _ => false,
        }
    }

    /// Drop every selection for a parlay, e.g. once it is settled.
    pub async fn clear_parlay(&self, parlay_id: &str) {
        self.entries.lock().await.retain(|(_, p), _| p != parlay_id);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
