use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Above this many slots, acquiring a lock first drops slots nobody holds.
const PRUNE_THRESHOLD: usize = 1024;

/// Table of async mutexes addressed by key. Used where the store offers no
/// transactional isolation: holders of a key's guard are the only writers for
/// that key.
pub struct KeyedLocks<K> {
    slots: DashMap<K, Arc<Mutex<()>>>,
    prune_threshold: usize,
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Ord + Clone,
{
    pub fn new() -> Self {
        Self::with_prune_threshold(PRUNE_THRESHOLD)
    }

    pub fn with_prune_threshold(prune_threshold: usize) -> Self {
        Self {
            slots: DashMap::new(),
            prune_threshold,
        }
    }

    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        self.prune_if_crowded();
        self.slot(key).lock_owned().await
    }

    /// Locks every key, in sorted order with duplicates removed, so two
    /// callers asking for overlapping key sets cannot deadlock each other.
    pub async fn lock_all<I>(&self, keys: I) -> Vec<OwnedMutexGuard<()>>
    where
        I: IntoIterator<Item = K>,
    {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        self.prune_if_crowded();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.slot(key).lock_owned().await);
        }
        guards
    }

    /// Removes slots that are neither held nor awaited.
    pub fn prune_idle(&self) {
        let before = self.slots.len();
        self.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        debug!(
            "Pruned {} idle lock slots",
            before.saturating_sub(self.slots.len())
        );
    }

    fn prune_if_crowded(&self) {
        if self.slots.len() > self.prune_threshold {
            self.prune_idle();
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, key: K) -> Arc<Mutex<()>> {
        self.slots
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }
}
