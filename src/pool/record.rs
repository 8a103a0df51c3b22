// src/pool/record.rs

use crate::config::preview_secret;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;

/// The immutable half of a pool entry: who the key is and what it sends upstream.
#[derive(Debug)]
pub struct KeyRecord {
    id: String,
    secret: Secret<String>,
}

impl KeyRecord {
    pub fn new(id: impl Into<String>, secret: Secret<String>) -> Self {
        Self {
            id: id.into(),
            secret,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &Secret<String> {
        &self.secret
    }

    pub fn preview(&self) -> String {
        preview_secret(self.secret.expose_secret())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "blacklisted_until", rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    Blacklisted(DateTime<Utc>),
}

impl KeyStatus {
    pub fn blacklisted_until(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Active => None,
            Self::Blacklisted(until) => Some(*until),
        }
    }

    /// Whether the key may be handed out at `now`; an elapsed quarantine counts as eligible.
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Active => true,
            Self::Blacklisted(until) => *until <= now,
        }
    }
}

/// The mutable half of a pool entry. Only ever touched under the slot lock in
/// [`KeyStore`](super::KeyStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRuntime {
    pub status: KeyStatus,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub blacklist_episodes: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl Default for KeyRuntime {
    fn default() -> Self {
        Self {
            status: KeyStatus::Active,
            consecutive_failures: 0,
            total_requests: 0,
            total_successes: 0,
            total_failures: 0,
            blacklist_episodes: 0,
            last_used_at: None,
            last_failure_at: None,
        }
    }
}

impl KeyRuntime {
    pub fn mark_used(&mut self, now: DateTime<Utc>) {
        self.last_used_at = Some(now);
    }

    pub fn record_success(&mut self) {
        self.total_requests += 1;
        self.total_successes += 1;
        self.consecutive_failures = 0;
        self.blacklist_episodes = 0;
    }

    /// Returns the consecutive failure count after this failure.
    pub fn record_failure(&mut self, now: DateTime<Utc>) -> u32 {
        self.total_requests += 1;
        self.total_failures += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure_at = Some(now);
        self.consecutive_failures
    }

    pub fn is_blacklisted(&self) -> bool {
        matches!(self.status, KeyStatus::Blacklisted(_))
    }

    /// Clears quarantine state. Lifetime counters are left alone.
    pub fn reset(&mut self) {
        self.status = KeyStatus::Active;
        self.consecutive_failures = 0;
        self.blacklist_episodes = 0;
    }
}

/// A consistent copy of one key's state, safe to hand to reporting code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySnapshot {
    pub id: String,
    pub preview: String,
    pub runtime: KeyRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn success_resets_consecutive_failures_and_keeps_totals_balanced() {
        let now = Utc::now();
        let mut rt = KeyRuntime::default();
        rt.record_failure(now);
        rt.record_failure(now);
        assert_eq!(rt.consecutive_failures, 2);

        rt.record_success();
        assert_eq!(rt.consecutive_failures, 0);
        assert_eq!(rt.total_requests, 3);
        assert_eq!(rt.total_successes + rt.total_failures, rt.total_requests);
    }

    #[test]
    fn reset_keeps_lifetime_counters() {
        let now = Utc::now();
        let mut rt = KeyRuntime::default();
        rt.record_failure(now);
        rt.status = KeyStatus::Blacklisted(now + Duration::seconds(30));
        rt.reset();
        assert_eq!(rt.status, KeyStatus::Active);
        assert_eq!(rt.consecutive_failures, 0);
        assert_eq!(rt.total_failures, 1);
    }

    #[test]
    fn eligibility_follows_deadline() {
        let now = Utc::now();
        let status = KeyStatus::Blacklisted(now + Duration::seconds(10));
        assert!(!status.is_eligible_at(now));
        assert!(status.is_eligible_at(now + Duration::seconds(10)));
        assert!(KeyStatus::Active.is_eligible_at(now));
    }

    #[test]
    fn record_debug_redacts_secret() {
        let record = KeyRecord::new("k1", Secret::new("sk-super-secret-value".to_string()));
        let debug = format!("{record:?}");
        assert!(!debug.contains("super-secret"));
    }
}
