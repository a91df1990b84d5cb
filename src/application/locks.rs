use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per key.
///
/// Callers holding the guard for key `a` never block callers working on key
/// `b`. The map entry is never held across an await point, and an entry is
/// dropped again once no caller holds or waits on it.
pub struct KeyedLocks<K: Eq + Hash + Clone + Ord> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

/// Holds one key's lock. Releasing it prunes the key if nobody else wants it.
pub struct KeyGuard<'a, K: Eq + Hash + Clone + Ord> {
    guard: Option<OwnedMutexGuard<()>>,
    key: K,
    locks: &'a DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone + Ord> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        // Unlock first so our own Arc no longer counts.
        self.guard.take();
        // Waiters clone the Arc under the same shard lock, so a count of one
        // means only the map still refers to the mutex.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl<K: Eq + Hash + Clone + Ord> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone + Ord> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &K) -> KeyGuard<'_, K> {
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        KeyGuard {
            guard: Some(mutex.lock_owned().await),
            key: key.clone(),
            locks: &self.locks,
        }
    }

    /// Locks every key in ascending order so two callers with overlapping key
    /// sets cannot deadlock.
    pub async fn lock_all(&self, keys: &[K]) -> Vec<KeyGuard<'_, K>> {
        let mut sorted = keys.to_vec();
        sorted.sort();
        sorted.dedup();
        let mut guards = Vec::with_capacity(sorted.len());
        for key in &sorted {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
