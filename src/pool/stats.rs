// src/pool/stats.rs

use crate::pool::clock::Clock;
use crate::pool::record::{KeySnapshot, KeyStatus};
use crate::pool::store::KeyStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedState {
    Active,
    Blacklisted,
}

/// Per-key view for the stats endpoint. Carries a masked preview, never the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyStats {
    pub id: String,
    pub preview: String,
    pub state: ReportedState,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blacklisted_until: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total_keys: usize,
    pub active_keys: usize,
    pub blacklisted_keys: usize,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub generated_at: DateTime<Utc>,
    pub keys: Vec<KeyStats>,
}

/// Read-only aggregation over the pool.
///
/// Reports *effective* state: a key whose quarantine has elapsed shows up as
/// active even if nobody has touched it since, and nothing is mutated.
#[derive(Debug, Clone)]
pub struct StatsReporter {
    store: Arc<KeyStore>,
    clock: Arc<dyn Clock>,
}

impl StatsReporter {
    pub fn new(store: Arc<KeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn snapshot(&self) -> PoolStats {
        let now = self.clock.now();
        let keys: Vec<KeyStats> = self
            .store
            .list_all()
            .into_iter()
            .map(|snap| key_stats(snap, now))
            .collect();

        let blacklisted_keys = keys
            .iter()
            .filter(|k| k.state == ReportedState::Blacklisted)
            .count();

        PoolStats {
            total_keys: keys.len(),
            active_keys: keys.len() - blacklisted_keys,
            blacklisted_keys,
            total_requests: keys.iter().map(|k| k.total_requests).sum(),
            total_successes: keys.iter().map(|k| k.total_successes).sum(),
            total_failures: keys.iter().map(|k| k.total_failures).sum(),
            generated_at: now,
            keys,
        }
    }

    /// Number of keys that could be selected right now.
    pub fn eligible_keys(&self) -> usize {
        let now = self.clock.now();
        self.store
            .list_all()
            .iter()
            .filter(|snap| snap.runtime.status.is_eligible_at(now))
            .count()
    }

    pub fn is_healthy(&self) -> bool {
        self.eligible_keys() > 0
    }
}

fn key_stats(snap: KeySnapshot, now: DateTime<Utc>) -> KeyStats {
    let rt = snap.runtime;
    let (state, blacklisted_until) = match rt.status {
        KeyStatus::Blacklisted(until) if until > now => (ReportedState::Blacklisted, Some(until)),
        _ => (ReportedState::Active, None),
    };

    KeyStats {
        id: snap.id,
        preview: snap.preview,
        state,
        total_requests: rt.total_requests,
        total_successes: rt.total_successes,
        total_failures: rt.total_failures,
        consecutive_failures: rt.consecutive_failures,
        blacklisted_until,
        last_used_at: rt.last_used_at,
        last_failure_at: rt.last_failure_at,
    }
}
