// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Replicated-map contract over the external shared-state store.
//!
//! Watchers are modeled as event streams; anything a watcher derives must
//! stay idempotent under replay, since a store reconnection replays state.

use ahash::RandomState;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// One observed change of a replicated map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapUpdate<K, V> {
    pub key: K,
    pub old: Option<V>,
    pub new: Option<V>,
}

/// A mapping shared across agents through the external store, with watch
/// callbacks and atomic add/remove.
pub trait ReplicatedMap<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn put(&self, key: K, value: V);
    fn remove(&self, key: &K);
    /// A point-in-time copy of the whole map.
    fn snapshot(&self) -> Vec<(K, V)>;
    fn watch(&self) -> broadcast::Receiver<MapUpdate<K, V>>;
}

/// In-memory [`ReplicatedMap`] used by the standalone agent and the tests.
pub struct MemMap<K, V> {
    entries: Mutex<HashMap<K, V, RandomState>>,
    updates: broadcast::Sender<MapUpdate<K, V>>,
}

impl<K: Clone, V: Clone> Default for MemMap<K, V> {
    fn default() -> Self {
        let (updates, _) = broadcast::channel(1024);
        Self {
            entries: Mutex::new(HashMap::with_hasher(RandomState::new())),
            updates,
        }
    }
}

impl<K: Clone, V: Clone> MemMap<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, V> ReplicatedMap<K, V> for MemMap<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: K, value: V) {
        let old = {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            entries.insert(key.clone(), value.clone())
        };
        let _ = self.updates.send(MapUpdate {
            key,
            old,
            new: Some(value),
        });
    }

    fn remove(&self, key: &K) {
        let old = {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            entries.remove(key)
        };
        if old.is_some() {
            let _ = self.updates.send(MapUpdate {
                key: key.clone(),
                old,
                new: None,
            });
        }
    }

    fn snapshot(&self) -> Vec<(K, V)> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn watch(&self) -> broadcast::Receiver<MapUpdate<K, V>> {
        self.updates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn updates_carry_old_and_new() {
        let map = MemMap::<&'static str, u32>::new();
        let mut rx = map.watch();

        map.put("a", 1);
        map.put("a", 2);
        map.remove(&"a");
        map.remove(&"a"); // no-op, no event

        assert_eq!(
            rx.recv().await.unwrap(),
            MapUpdate { key: "a", old: None, new: Some(1) }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            MapUpdate { key: "a", old: Some(1), new: Some(2) }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            MapUpdate { key: "a", old: Some(2), new: None }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn snapshot_is_a_copy() {
        let map = MemMap::<u32, u32>::new();
        map.put(1, 10);
        map.put(2, 20);
        let mut snap = map.snapshot();
        snap.sort_unstable();
        assert_eq!(snap, vec![(1, 10), (2, 20)]);
    }
}
