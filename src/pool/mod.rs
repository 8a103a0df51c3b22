// src/pool/mod.rs

pub mod blacklist;
pub mod clock;
pub mod record;
pub mod selector;
pub mod stats;
pub mod store;

pub use blacklist::{BlacklistEntry, BlacklistManager, BlacklistPolicy, ResetSummary};
pub use clock::{Clock, ManualClock, SystemClock};
pub use record::{KeyRecord, KeyRuntime, KeySnapshot, KeyStatus};
pub use selector::KeySelector;
pub use stats::{KeyStats, PoolStats, ReportedState, StatsReporter};
pub use store::KeyStore;
