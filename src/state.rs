// src/state.rs

use crate::config::AppConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::pool::{
    BlacklistManager, BlacklistPolicy, Clock, KeySelector, KeyStore, StatsReporter, SystemClock,
};
use crate::proxy::{Forwarder, HttpForwarder};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

/// Represents the shared application state that is accessible by all Axum handlers.
#[derive(Debug)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<KeyStore>,
    pub blacklist: BlacklistManager,
    pub selector: KeySelector,
    pub dispatcher: Dispatcher,
    pub stats: StatsReporter,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Builds the pool from `config` and wires it to a real HTTP forwarder.
    pub fn new(config: AppConfig) -> Result<Self> {
        let forwarder = Arc::new(HttpForwarder::new(&config)?);
        Ok(Self::with_parts(config, forwarder, Arc::new(SystemClock)))
    }

    /// Same as [`AppState::new`] but with an injected forwarder and clock.
    pub fn with_parts(
        config: AppConfig,
        forwarder: Arc<dyn Forwarder>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!("Creating shared AppState: initializing key pool...");
        let store = Arc::new(KeyStore::from_config(&config));
        let blacklist = BlacklistManager::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            BlacklistPolicy::from(&config.pool),
        );
        let selector = KeySelector::new(Arc::clone(&store), blacklist.clone(), Arc::clone(&clock));
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            selector.clone(),
            blacklist.clone(),
            forwarder,
            Arc::clone(&clock),
            config.pool.max_retries,
        );
        let stats = StatsReporter::new(Arc::clone(&store), Arc::clone(&clock));
        let started_at = clock.now();

        info!(keys = store.len(), "Key pool ready");
        Self {
            config,
            store,
            blacklist,
            selector,
            dispatcher,
            stats,
            started_at,
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyEntry;

    fn config() -> AppConfig {
        AppConfig {
            keys: vec![
                KeyEntry::with_id("primary", "sk-primary-0000000000"),
                KeyEntry::new("sk-secondary-0000000000"),
            ],
            ..AppConfig::default()
        }
    }

    #[test]
    fn builds_pool_in_config_order() {
        let state = AppState::new(config()).unwrap();
        let ids: Vec<String> = state.store.list_all().into_iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], "primary");
        assert!(ids[1].starts_with("key-"));
        assert_eq!(state.dispatcher.max_retries(), 2);
    }

    #[test]
    fn fresh_pool_is_healthy() {
        let state = AppState::new(config()).unwrap();
        assert!(state.stats.is_healthy());
        assert!(state.uptime_secs() >= 0);
    }
}
