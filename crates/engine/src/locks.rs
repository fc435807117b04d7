//! Keyed async locks: one mutex per ticket or queue, created on first use
//! and dropped again once nobody holds or waits for it.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Table<K> = DashMap<K, Arc<Mutex<()>>>;

pub(crate) struct KeyedLocks<K: Eq + Hash + Copy> {
    table: Arc<Table<K>>,
}

impl<K: Eq + Hash + Copy> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<K: Eq + Hash + Copy> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            table: Arc::new(DashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Copy + Ord> KeyedLocks<K> {
    pub(crate) async fn lock(&self, key: K) -> KeyGuard<K> {
        let mutex = Arc::clone(self.table.entry(key).or_default().value());
        KeyGuard {
            guard: Some(mutex.lock_owned().await),
            key,
            table: Arc::clone(&self.table),
        }
    }

    /// Lock two keys in order. The same key twice is locked once.
    pub(crate) async fn lock_pair(&self, a: K, b: K) -> Vec<KeyGuard<K>> {
        if a == b {
            return vec![self.lock(a).await];
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first = self.lock(first).await;
        let second = self.lock(second).await;
        vec![first, second]
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.len()
    }
}

#[must_use]
pub(crate) struct KeyGuard<K: Eq + Hash + Copy> {
    guard: Option<OwnedMutexGuard<()>>,
    key: K,
    table: Arc<Table<K>>,
}

impl<K: Eq + Hash + Copy> Drop for KeyGuard<K> {
    fn drop(&mut self) {
        // Release first so the table entry is the only remaining reference.
        self.guard.take();
        self.table
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
