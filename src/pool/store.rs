// src/pool/store.rs

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::pool::record::{KeyRecord, KeyRuntime, KeySnapshot};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, trace};

#[derive(Debug)]
struct KeySlot {
    record: Arc<KeyRecord>,
    runtime: Mutex<KeyRuntime>,
}

/// Owns the key pool: the fixed, ordered set of records, their runtime state,
/// and the rotation cursor.
///
/// Every slot has its own lock, so traffic on one key never waits for another.
/// Locks are held only for the duration of a closure passed to [`KeyStore::update`]
/// and are never held across an `.await`.
#[derive(Debug)]
pub struct KeyStore {
    slots: Vec<KeySlot>,
    index: HashMap<String, usize>,
    cursor: AtomicUsize,
}

impl KeyStore {
    /// Builds the pool from `(identifier, record)` pairs in rotation order.
    /// Later duplicates of an identifier are ignored; validation rejects them earlier.
    pub fn new(records: impl IntoIterator<Item = KeyRecord>) -> Self {
        let mut slots = Vec::new();
        let mut index = HashMap::new();
        for record in records {
            if index.contains_key(record.id()) {
                continue;
            }
            index.insert(record.id().to_string(), slots.len());
            slots.push(KeySlot {
                record: Arc::new(record),
                runtime: Mutex::new(KeyRuntime::default()),
            });
        }

        Self {
            slots,
            index,
            cursor: AtomicUsize::new(0),
        }
    }

    #[instrument(skip(config), name = "key_store_init")]
    pub fn from_config(config: &AppConfig) -> Self {
        let store = Self::new(
            config
                .resolved_keys()
                .into_iter()
                .map(|(id, entry)| KeyRecord::new(id, entry.secret.clone())),
        );
        info!(keys = store.len(), "Key pool initialized");
        store
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, id: &str) -> Result<&KeySlot> {
        self.index
            .get(id)
            .map(|&i| &self.slots[i])
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    /// The credential behind `id`.
    pub fn record(&self, id: &str) -> Result<Arc<KeyRecord>> {
        self.slot(id).map(|slot| Arc::clone(&slot.record))
    }

    /// Record at rotation position `position` (taken modulo the pool size).
    pub fn record_at(&self, position: usize) -> Option<Arc<KeyRecord>> {
        if self.slots.is_empty() {
            return None;
        }
        Some(Arc::clone(&self.slots[position % self.slots.len()].record))
    }

    /// Rotation position of `id`, if it is in the pool.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Result<KeySnapshot> {
        self.slot(id).map(Self::snapshot)
    }

    /// Snapshots of every key, in rotation order.
    pub fn list_all(&self) -> Vec<KeySnapshot> {
        self.slots.iter().map(Self::snapshot).collect()
    }

    fn snapshot(slot: &KeySlot) -> KeySnapshot {
        let runtime = slot.runtime.lock().clone();
        KeySnapshot {
            id: slot.record.id().to_string(),
            preview: slot.record.preview(),
            runtime,
        }
    }

    /// Applies `mutation` to the runtime state of `id` while holding that key's lock.
    pub fn update<R>(&self, id: &str, mutation: impl FnOnce(&mut KeyRuntime) -> R) -> Result<R> {
        let slot = self.slot(id)?;
        let mut runtime = slot.runtime.lock();
        trace!(key.id = id, "Applying key state mutation");
        Ok(mutation(&mut runtime))
    }

    /// Applies `mutation` to every key, one lock at a time.
    pub fn update_all<R>(&self, mut mutation: impl FnMut(&str, &mut KeyRuntime) -> R) -> Vec<R> {
        self.slots
            .iter()
            .map(|slot| {
                let mut runtime = slot.runtime.lock();
                mutation(slot.record.id(), &mut runtime)
            })
            .collect()
    }

    /// Returns the current cursor value and advances it by one.
    pub fn advance_cursor(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::Relaxed)
    }
}
