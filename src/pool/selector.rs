// src/pool/selector.rs

use crate::error::{AppError, Result};
use crate::pool::blacklist::BlacklistManager;
use crate::pool::clock::Clock;
use crate::pool::record::KeyRecord;
use crate::pool::store::KeyStore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Round-robin key selection over the pool's insertion order.
///
/// The shared cursor moves on every selection, successful or not, so load keeps
/// spreading even while some keys fail. Two concurrent callers can land on the
/// same key; that only costs fairness, never correctness.
#[derive(Debug, Clone)]
pub struct KeySelector {
    store: Arc<KeyStore>,
    blacklist: BlacklistManager,
    clock: Arc<dyn Clock>,
}

impl KeySelector {
    pub fn new(store: Arc<KeyStore>, blacklist: BlacklistManager, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            blacklist,
            clock,
        }
    }

    /// Picks the next eligible key that is not in `excluding`.
    ///
    /// Scans at most one full cycle of the pool and fails with
    /// [`AppError::NoKeyAvailable`] instead of spinning.
    #[instrument(level = "debug", skip_all, fields(excluded = excluding.len()))]
    pub fn select_key(&self, excluding: &HashSet<String>) -> Result<Arc<KeyRecord>> {
        let pool_size = self.store.len();
        if pool_size == 0 {
            warn!("Key pool is empty");
            return Err(AppError::NoKeyAvailable);
        }

        let start = self.store.advance_cursor();
        for offset in 0..pool_size {
            let Some(record) = self.store.record_at(start.wrapping_add(offset)) else {
                break;
            };
            if excluding.contains(record.id()) {
                continue;
            }
            if !self.blacklist.is_eligible(record.id())? {
                continue;
            }

            let now = self.clock.now();
            self.store.update(record.id(), |rt| rt.mark_used(now))?;
            debug!(
                key.id = record.id(),
                key.preview = %record.preview(),
                position = start.wrapping_add(offset) % pool_size,
                "Selected API key (round-robin)"
            );
            return Ok(record);
        }

        warn!(
            pool_size,
            excluded = excluding.len(),
            "No eligible key found after a full rotation"
        );
        Err(AppError::NoKeyAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::blacklist::BlacklistPolicy;
    use crate::pool::clock::ManualClock;
    use secrecy::Secret;
    use std::time::Duration;

    fn setup(ids: &[&str]) -> (Arc<KeyStore>, Arc<ManualClock>, BlacklistManager, KeySelector) {
        let store = Arc::new(KeyStore::new(
            ids.iter()
                .map(|id| KeyRecord::new(*id, Secret::new(format!("sk-{id}")))),
        ));
        let clock = Arc::new(ManualClock::default());
        let blacklist = BlacklistManager::new(
            Arc::clone(&store),
            clock.clone(),
            BlacklistPolicy::default(),
        );
        let selector = KeySelector::new(Arc::clone(&store), blacklist.clone(), clock.clone());
        (store, clock, blacklist, selector)
    }

    fn pick(selector: &KeySelector) -> String {
        selector
            .select_key(&HashSet::new())
            .unwrap()
            .id()
            .to_string()
    }

    #[test]
    fn each_key_once_per_cycle() {
        let (_, _, _, selector) = setup(&["k1", "k2", "k3"]);
        let picks: Vec<_> = (0..3).map(|_| pick(&selector)).collect();
        assert_eq!(picks, vec!["k1", "k2", "k3"]);
        assert_eq!(pick(&selector), "k1");
    }

    #[test]
    fn skips_blacklisted_and_excluded() {
        let (_, _, blacklist, selector) = setup(&["k1", "k2", "k3"]);
        blacklist.blacklist("k2", Duration::from_secs(60)).unwrap();
        let excluding: HashSet<String> = ["k3".to_string()].into();
        for _ in 0..5 {
            assert_eq!(selector.select_key(&excluding).unwrap().id(), "k1");
        }
    }

    #[test]
    fn exhausted_pool_reports_no_key() {
        let (_, _, blacklist, selector) = setup(&["k1", "k2"]);
        blacklist.blacklist("k1", Duration::from_secs(60)).unwrap();
        blacklist.blacklist("k2", Duration::from_secs(60)).unwrap();
        assert!(matches!(
            selector.select_key(&HashSet::new()),
            Err(AppError::NoKeyAvailable)
        ));
    }

    #[test]
    fn expired_key_is_selectable_again() {
        let (store, clock, blacklist, selector) = setup(&["k1"]);
        blacklist.blacklist("k1", Duration::from_secs(60)).unwrap();
        assert!(selector.select_key(&HashSet::new()).is_err());

        clock.advance(Duration::from_secs(61));
        assert_eq!(pick(&selector), "k1");
        assert!(!store.get("k1").unwrap().runtime.is_blacklisted());
    }

    #[test]
    fn selection_stamps_last_used() {
        let (store, clock, _, selector) = setup(&["k1"]);
        assert!(store.get("k1").unwrap().runtime.last_used_at.is_none());
        pick(&selector);
        assert_eq!(store.get("k1").unwrap().runtime.last_used_at, Some(clock.now()));
    }

    #[test]
    fn empty_pool_has_no_key() {
        let (_, _, _, selector) = setup(&[]);
        assert!(matches!(
            selector.select_key(&HashSet::new()),
            Err(AppError::NoKeyAvailable)
        ));
    }
}
