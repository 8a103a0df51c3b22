// src/pool/blacklist.rs

use crate::config::PoolConfig;
use crate::error::Result;
use crate::pool::clock::{deadline_after, Clock};
use crate::pool::record::KeyStatus;
use crate::pool::store::KeyStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// When keys get quarantined and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlacklistPolicy {
    pub failure_threshold: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for BlacklistPolicy {
    fn default() -> Self {
        Self::from(&PoolConfig::default())
    }
}

impl From<&PoolConfig> for BlacklistPolicy {
    fn from(config: &PoolConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            backoff_base: Duration::from_secs(config.backoff_base_secs),
            backoff_max: Duration::from_secs(config.backoff_max_secs),
        }
    }
}

impl BlacklistPolicy {
    /// Quarantine length for the `episode`-th consecutive blacklisting (1-based):
    /// `base * 2^(episode-1)`, capped at `backoff_max`.
    pub fn backoff_for(&self, episode: u32) -> Duration {
        let exponent = episode.saturating_sub(1).min(31);
        self.backoff_base
            .checked_mul(1u32 << exponent)
            .map_or(self.backoff_max, |d| d.min(self.backoff_max))
    }

    pub fn threshold_reached(&self, consecutive_failures: u32) -> bool {
        consecutive_failures >= self.failure_threshold
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlacklistEntry {
    pub id: String,
    pub blacklisted_until: DateTime<Utc>,
    pub consecutive_failures: u32,
    pub episodes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub reset: usize,
    pub previously_blacklisted: usize,
}

/// Tracks quarantined keys. Expiry is lazy: a key whose deadline has passed is
/// released the next time anyone asks whether it is eligible, so no timer task exists.
#[derive(Debug, Clone)]
pub struct BlacklistManager {
    store: Arc<KeyStore>,
    clock: Arc<dyn Clock>,
    policy: BlacklistPolicy,
}

impl BlacklistManager {
    pub fn new(store: Arc<KeyStore>, clock: Arc<dyn Clock>, policy: BlacklistPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &BlacklistPolicy {
        &self.policy
    }

    /// True if the key is Active, or its quarantine has elapsed (in which case
    /// it is moved back to Active as part of this call).
    pub fn is_eligible(&self, id: &str) -> Result<bool> {
        let now = self.clock.now();
        let (eligible, released) = self.store.update(id, |rt| match rt.status {
            KeyStatus::Active => (true, false),
            KeyStatus::Blacklisted(until) if until <= now => {
                rt.status = KeyStatus::Active;
                (true, true)
            }
            KeyStatus::Blacklisted(_) => (false, false),
        })?;

        if released {
            info!(key.id = id, "Blacklist expired, key returned to rotation");
        }
        Ok(eligible)
    }

    /// Quarantines `id` for `duration` from now. Calling it on an already
    /// blacklisted key refreshes the deadline without starting a new episode.
    pub fn blacklist(&self, id: &str, duration: Duration) -> Result<DateTime<Utc>> {
        let now = self.clock.now();
        let until = deadline_after(now, duration);
        let episodes = self.store.update(id, |rt| {
            if !rt.is_blacklisted() {
                rt.blacklist_episodes = rt.blacklist_episodes.saturating_add(1);
            }
            rt.status = KeyStatus::Blacklisted(until);
            rt.blacklist_episodes
        })?;

        warn!(
            key.id = id,
            until = %until,
            duration_secs = duration.as_secs(),
            episodes,
            "Key blacklisted"
        );
        Ok(until)
    }

    /// Quarantines `id` using the exponential backoff for its next episode.
    pub fn blacklist_with_backoff(&self, id: &str) -> Result<DateTime<Utc>> {
        let now = self.clock.now();
        let policy = self.policy;
        let (until, episode) = self.store.update(id, |rt| {
            let active = rt.status.is_eligible_at(now);
            let episode = if active {
                rt.blacklist_episodes.saturating_add(1)
            } else {
                rt.blacklist_episodes.max(1)
            };
            let until = deadline_after(now, policy.backoff_for(episode));
            rt.blacklist_episodes = episode;
            rt.status = KeyStatus::Blacklisted(until);
            (until, episode)
        })?;

        warn!(
            key.id = id,
            until = %until,
            episode,
            "Key blacklisted with backoff"
        );
        Ok(until)
    }

    /// Quarantines a key whose credential was rejected. Such keys do not
    /// recover on their own, so they get the longest backoff.
    pub fn disqualify(&self, id: &str) -> Result<DateTime<Utc>> {
        self.blacklist(id, self.policy.backoff_max)
    }

    /// Forces `id` back to Active and clears its failure streak.
    /// Returns whether the key was blacklisted before the reset.
    pub fn reset(&self, id: &str) -> Result<bool> {
        let was_blacklisted = self.store.update(id, |rt| {
            let was = rt.is_blacklisted();
            rt.reset();
            was
        })?;
        info!(key.id = id, was_blacklisted, "Key state reset");
        Ok(was_blacklisted)
    }

    pub fn reset_all(&self) -> ResetSummary {
        let was_blacklisted = self.store.update_all(|_, rt| {
            let was = rt.is_blacklisted();
            rt.reset();
            was
        });
        let summary = ResetSummary {
            reset: was_blacklisted.len(),
            previously_blacklisted: was_blacklisted.iter().filter(|b| **b).count(),
        };
        info!(
            reset = summary.reset,
            previously_blacklisted = summary.previously_blacklisted,
            "All keys reset"
        );
        summary
    }

    /// Keys whose quarantine is still running, in rotation order. Read-only:
    /// expired entries are skipped, not released.
    pub fn entries(&self) -> Vec<BlacklistEntry> {
        let now = self.clock.now();
        self.store
            .list_all()
            .into_iter()
            .filter_map(|snap| match snap.runtime.status {
                KeyStatus::Blacklisted(until) if until > now => Some(BlacklistEntry {
                    id: snap.id,
                    blacklisted_until: until,
                    consecutive_failures: snap.runtime.consecutive_failures,
                    episodes: snap.runtime.blacklist_episodes,
                }),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::clock::ManualClock;
    use crate::pool::record::KeyRecord;
    use secrecy::Secret;

    fn setup(ids: &[&str]) -> (Arc<KeyStore>, Arc<ManualClock>, BlacklistManager) {
        let store = Arc::new(KeyStore::new(
            ids.iter()
                .map(|id| KeyRecord::new(*id, Secret::new(format!("sk-{id}")))),
        ));
        let clock = Arc::new(ManualClock::default());
        let manager = BlacklistManager::new(
            Arc::clone(&store),
            clock.clone(),
            BlacklistPolicy::default(),
        );
        (store, clock, manager)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = BlacklistPolicy {
            failure_threshold: 3,
            backoff_base: Duration::from_secs(30),
            backoff_max: Duration::from_secs(100),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_secs(30));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(60));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(100));
        assert_eq!(policy.backoff_for(u32::MAX), Duration::from_secs(100));
    }

    #[test]
    fn blacklisted_key_is_ineligible_until_deadline() {
        let (store, clock, manager) = setup(&["k1"]);
        let until = manager.blacklist("k1", Duration::from_secs(30)).unwrap();
        assert!(until > clock.now());
        assert!(!manager.is_eligible("k1").unwrap());

        clock.advance(Duration::from_secs(29));
        assert!(!manager.is_eligible("k1").unwrap());

        clock.advance(Duration::from_secs(1));
        assert!(manager.is_eligible("k1").unwrap());
        assert_eq!(store.get("k1").unwrap().runtime.status, KeyStatus::Active);
    }

    #[test]
    fn blacklist_is_idempotent_and_refreshes_deadline() {
        let (store, clock, manager) = setup(&["k1"]);
        let first = manager.blacklist("k1", Duration::from_secs(30)).unwrap();
        clock.advance(Duration::from_secs(10));
        let second = manager.blacklist("k1", Duration::from_secs(30)).unwrap();
        assert!(second > first);
        assert_eq!(store.get("k1").unwrap().runtime.blacklist_episodes, 1);
    }

    #[test]
    fn repeated_episodes_back_off_exponentially() {
        let (_, clock, manager) = setup(&["k1"]);
        let start = clock.now();
        let first = manager.blacklist_with_backoff("k1").unwrap();
        assert_eq!((first - start).num_seconds(), 30);

        clock.advance(Duration::from_secs(30));
        assert!(manager.is_eligible("k1").unwrap());
        let now = clock.now();
        let second = manager.blacklist_with_backoff("k1").unwrap();
        assert_eq!((second - now).num_seconds(), 60);
    }

    #[test]
    fn reset_all_restores_and_counts() {
        let (store, _, manager) = setup(&["k1", "k2", "k3"]);
        store.update("k1", |rt| rt.record_failure(Utc::now())).unwrap();
        manager.blacklist("k1", Duration::from_secs(60)).unwrap();
        manager.disqualify("k2").unwrap();

        let summary = manager.reset_all();
        assert_eq!(summary, ResetSummary { reset: 3, previously_blacklisted: 2 });
        assert!(manager.entries().is_empty());

        let k1 = store.get("k1").unwrap().runtime;
        assert_eq!(k1.status, KeyStatus::Active);
        assert_eq!(k1.consecutive_failures, 0);
        assert_eq!(k1.total_failures, 1);
    }

    #[test]
    fn entries_skip_expired_without_releasing() {
        let (store, clock, manager) = setup(&["k1", "k2"]);
        manager.blacklist("k1", Duration::from_secs(10)).unwrap();
        manager.blacklist("k2", Duration::from_secs(100)).unwrap();
        clock.advance(Duration::from_secs(20));

        let entries = manager.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "k2");
        assert!(store.get("k1").unwrap().runtime.is_blacklisted());
    }

    #[test]
    fn unknown_key_errors() {
        let (_, _, manager) = setup(&["k1"]);
        assert!(manager.is_eligible("ghost").is_err());
        assert!(manager.reset("ghost").is_err());
    }
}
