//! Per-key memoized derivations.
//!
//! [`Memoized`] attaches a derived value to each distinct key (typically a
//! record) the first time it is asked for, and hands back the same
//! `Arc<V>` on every later call. It is a concurrent map underneath
//! (`dashmap::DashMap`): compute-or-fetch goes through the map's entry API,
//! which holds the key's shard lock while the value is derived, so a key is
//! derived at most once even when callers race on it.
//!
//! The derive function must not call back into the same `Memoized`; the
//! shard lock is held while it runs.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

pub struct Memoized<K, V, F>
where
    K: Eq + Hash,
{
    cache: DashMap<K, Arc<V>>,
    derive: F,
}

impl<K, V, F> Memoized<K, V, F>
where
    K: Eq + Hash + Clone,
    F: Fn(&K) -> V,
{
    pub fn new(derive: F) -> Self {
        Self {
            cache: DashMap::new(),
            derive,
        }
    }

    /// The derived value for `key`, computing it on first access.
    pub fn get(&self, key: &K) -> Arc<V> {
        if let Some(hit) = self.cache.get(key) {
            return Arc::clone(hit.value());
        }
        let entry = self
            .cache
            .entry(key.clone())
            .or_insert_with(|| Arc::new((self.derive)(key)));
        Arc::clone(entry.value())
    }

    /// The cached value for `key`, without deriving one.
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        self.cache.get(key).map(|hit| Arc::clone(hit.value()))
    }

    /// Forget the value for a record that went away.
    pub fn invalidate(&self, key: &K) -> bool {
        self.cache.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
