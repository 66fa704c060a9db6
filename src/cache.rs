//! Bounded store of rendered timepoints.
//!
//! Entries are shared as `Arc<V>` so a caller keeps its volume even after
//! the cache evicts it. Which entry goes when the cache overflows is
//! decided by an [`EvictionPolicy`].

use log::trace;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Picks the entry to drop when a cache holds more than its capacity.
pub trait EvictionPolicy {
    /// Key to evict among `keys` (ascending, never empty).
    fn victim(&self, keys: &mut dyn Iterator<Item = usize>) -> Option<usize>;
}

/// Evicts the numerically smallest timepoint, regardless of access order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestTimepoint;

impl EvictionPolicy for LowestTimepoint {
    fn victim(&self, keys: &mut dyn Iterator<Item = usize>) -> Option<usize> {
        keys.next()
    }
}

pub struct VolumeCache<V, P = LowestTimepoint> {
    capacity: usize,
    entries: BTreeMap<usize, Arc<V>>,
    policy: P,
}

impl<V> VolumeCache<V, LowestTimepoint> {
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, LowestTimepoint)
    }
}

impl<V, P: EvictionPolicy> VolumeCache<V, P> {
    pub fn with_policy(capacity: usize, policy: P) -> Self {
        VolumeCache { capacity, entries: BTreeMap::new(), policy }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, timepoint: usize) -> bool {
        self.entries.contains_key(&timepoint)
    }

    pub fn get(&self, timepoint: usize) -> Option<Arc<V>> {
        self.entries.get(&timepoint).cloned()
    }

    /// Cached timepoints, ascending.
    pub fn timepoints(&self) -> Vec<usize> {
        self.entries.keys().copied().collect()
    }

    /// Stores `value` and evicts until the capacity holds again.
    /// Returns the shared handle to the stored value.
    pub fn put(&mut self, timepoint: usize, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.entries.insert(timepoint, Arc::clone(&value));
        while self.entries.len() > self.capacity {
            let victim = self.policy.victim(&mut self.entries.keys().copied());
            match victim.and_then(|key| self.entries.remove(&key).map(|_| key)) {
                Some(key) => trace!("Evicted timepoint {} from the volume cache", key),
                None => break,
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lowest_timepoint_is_evicted() {
        let mut cache = VolumeCache::new(2);
        cache.put(0, "zero");
        cache.put(1, "one");
        cache.put(2, "two");
        assert_eq!(cache.timepoints(), vec![1, 2]);
        assert!(cache.get(0).is_none());
        assert_eq!(cache.get(2).as_deref(), Some(&"two"));
    }

    #[test]
    fn eviction_ignores_access_order() {
        let mut cache = VolumeCache::new(2);
        cache.put(5, 5);
        cache.put(3, 3);
        let _ = cache.get(3);
        cache.put(9, 9);
        assert_eq!(cache.timepoints(), vec![5, 9]);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut cache = VolumeCache::new(0);
        let handle = cache.put(1, 10u8);
        assert_eq!(*handle, 10);
        assert!(cache.is_empty());
    }

    #[test]
    fn replacing_a_key_keeps_size() {
        let mut cache = VolumeCache::new(2);
        cache.put(1, 'a');
        cache.put(1, 'b');
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(1).as_deref(), Some(&'b'));
    }

    struct HighestTimepoint;

    impl EvictionPolicy for HighestTimepoint {
        fn victim(&self, keys: &mut dyn Iterator<Item = usize>) -> Option<usize> {
            keys.last()
        }
    }

    #[test]
    fn policy_is_pluggable() {
        let mut cache = VolumeCache::with_policy(1, HighestTimepoint);
        cache.put(1, ());
        cache.put(4, ());
        assert_eq!(cache.timepoints(), vec![1]);
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(
            capacity in 0usize..8,
            keys in proptest::collection::vec(0usize..32, 0..64),
        ) {
            let mut cache = VolumeCache::new(capacity);
            for key in keys {
                cache.put(key, key);
                prop_assert!(cache.len() <= capacity);
            }
        }
    }
}
