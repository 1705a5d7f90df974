//! Storage strategies backing the collectors.
//!
//! A collector is written once against [`KeyedCounter`] and [`BoundedSamples`]
//! and instantiated with one of two [`CollectorMode`]s:
//!
//! - [`Exclusive`]: plain ordered maps behind a `RefCell`. The collector is
//!   `Send` but not `Sync`, so the compiler guarantees a single owner and no
//!   synchronization is paid for.
//! - [`Shared`]: `DashMap` with atomic counters. Safe to feed from several
//!   threads and to snapshot while collection is still running.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Bounds required from a collector key.
pub trait CollectorKey: Ord + Hash + Eq + Clone + Send + Sync + 'static {}

impl<T> CollectorKey for T where T: Ord + Hash + Eq + Clone + Send + Sync + 'static {}

/// A map of monotonically increasing counters.
pub trait KeyedCounter<K: CollectorKey>: Default + Send {
    fn add(&self, key: K, n: u64);

    fn increment(&self, key: K) {
        self.add(key, 1);
    }

    /// Point-in-time copy of every counter.
    fn snapshot(&self) -> BTreeMap<K, u64>;
}

/// A map of append-only lists, each capped at a caller-supplied size.
pub trait BoundedSamples<K: CollectorKey, V: Clone + Send + Sync + 'static>: Default + Send {
    /// Appends the value produced by `sample` if the list for `key` holds
    /// fewer than `max` entries. `sample` is not called otherwise.
    ///
    /// Returns true if a value was appended.
    fn offer<F>(&self, key: K, max: usize, sample: F) -> bool
    where
        F: FnOnce() -> V;

    /// Point-in-time copy of every list.
    fn snapshot(&self) -> BTreeMap<K, Vec<V>>;
}

/// Selects the storage used by a collector.
pub trait CollectorMode: Send + Sync + 'static {
    /// Name used in logs.
    const NAME: &'static str;

    type Counter<K: CollectorKey>: KeyedCounter<K>;
    type Samples<K: CollectorKey, V: Clone + Send + Sync + 'static>: BoundedSamples<K, V>;
}

/// Single-owner collection, no synchronization.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exclusive;

/// Concurrent collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Shared;

impl CollectorMode for Exclusive {
    const NAME: &'static str = "exclusive";

    type Counter<K: CollectorKey> = ExclusiveCounter<K>;
    type Samples<K: CollectorKey, V: Clone + Send + Sync + 'static> = ExclusiveSamples<K, V>;
}

impl CollectorMode for Shared {
    const NAME: &'static str = "shared";

    type Counter<K: CollectorKey> = SharedCounter<K>;
    type Samples<K: CollectorKey, V: Clone + Send + Sync + 'static> = SharedSamples<K, V>;
}

#[derive(Debug)]
pub struct ExclusiveCounter<K> {
    counts: RefCell<BTreeMap<K, u64>>,
}

impl<K> Default for ExclusiveCounter<K> {
    fn default() -> Self {
        Self {
            counts: RefCell::new(BTreeMap::new()),
        }
    }
}

impl<K: CollectorKey> KeyedCounter<K> for ExclusiveCounter<K> {
    fn add(&self, key: K, n: u64) {
        *self.counts.borrow_mut().entry(key).or_insert(0) += n;
    }

    fn snapshot(&self) -> BTreeMap<K, u64> {
        self.counts.borrow().clone()
    }
}

#[derive(Debug)]
pub struct SharedCounter<K: Hash + Eq> {
    counts: DashMap<K, AtomicU64>,
}

impl<K: Hash + Eq> Default for SharedCounter<K> {
    fn default() -> Self {
        Self {
            counts: DashMap::new(),
        }
    }
}

impl<K: CollectorKey> KeyedCounter<K> for SharedCounter<K> {
    fn add(&self, key: K, n: u64) {
        // Read lock on the hot path, entry lock only for the first insert
        if let Some(counter) = self.counts.get(&key) {
            counter.fetch_add(n, Ordering::Relaxed);
            return;
        }
        self.counts
            .entry(key)
            .or_default()
            .fetch_add(n, Ordering::Relaxed);
    }

    fn snapshot(&self) -> BTreeMap<K, u64> {
        self.counts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }
}

#[derive(Debug)]
pub struct ExclusiveSamples<K, V> {
    samples: RefCell<BTreeMap<K, Vec<V>>>,
}

impl<K, V> Default for ExclusiveSamples<K, V> {
    fn default() -> Self {
        Self {
            samples: RefCell::new(BTreeMap::new()),
        }
    }
}

impl<K, V> BoundedSamples<K, V> for ExclusiveSamples<K, V>
where
    K: CollectorKey,
    V: Clone + Send + Sync + 'static,
{
    fn offer<F>(&self, key: K, max: usize, sample: F) -> bool
    where
        F: FnOnce() -> V,
    {
        let mut samples = self.samples.borrow_mut();
        let list = samples.entry(key).or_default();
        if list.len() < max {
            list.push(sample());
            true
        } else {
            false
        }
    }

    fn snapshot(&self) -> BTreeMap<K, Vec<V>> {
        self.samples.borrow().clone()
    }
}

#[derive(Debug)]
pub struct SharedSamples<K: Hash + Eq, V> {
    samples: DashMap<K, Vec<V>>,
}

impl<K: Hash + Eq, V> Default for SharedSamples<K, V> {
    fn default() -> Self {
        Self {
            samples: DashMap::new(),
        }
    }
}

impl<K, V> BoundedSamples<K, V> for SharedSamples<K, V>
where
    K: CollectorKey,
    V: Clone + Send + Sync + 'static,
{
    fn offer<F>(&self, key: K, max: usize, sample: F) -> bool
    where
        F: FnOnce() -> V,
    {
        // The length check and the push happen under the same entry lock.
        let mut list = self.samples.entry(key).or_default();
        if list.len() < max {
            list.push(sample());
            true
        } else {
            false
        }
    }

    fn snapshot(&self) -> BTreeMap<K, Vec<V>> {
        self.samples
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn exercise_counter<C: KeyedCounter<&'static str>>() {
        let counter = C::default();
        counter.increment("a");
        counter.increment("a");
        counter.add("b", 5);
        let snapshot = counter.snapshot();
        assert_eq!(snapshot.get("a"), Some(&2));
        assert_eq!(snapshot.get("b"), Some(&5));
        assert_eq!(snapshot.get("c"), None);
    }

    fn exercise_samples<S: BoundedSamples<&'static str, u32>>() {
        let samples = S::default();
        for i in 0..5 {
            samples.offer("a", 3, || i);
        }
        assert!(!samples.offer("a", 3, || unreachable!("list is full")));
        assert_eq!(samples.snapshot().get("a"), Some(&vec![0, 1, 2]));
    }

    #[test]
    fn test_exclusive_strategy() {
        exercise_counter::<ExclusiveCounter<&'static str>>();
        exercise_samples::<ExclusiveSamples<&'static str, u32>>();
    }

    #[test]
    fn test_shared_strategy() {
        exercise_counter::<SharedCounter<&'static str>>();
        exercise_samples::<SharedSamples<&'static str, u32>>();
    }

    #[test]
    fn test_shared_samples_bound_under_contention() {
        let samples = Arc::new(SharedSamples::<u8, usize>::default());
        let counter = Arc::new(SharedCounter::<u8>::default());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let samples = Arc::clone(&samples);
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for i in 0..1_000 {
                        counter.increment(0);
                        samples.offer(0, 10, || t * 1_000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.snapshot().get(&0), Some(&8_000));
        assert_eq!(samples.snapshot().get(&0).map(Vec::len), Some(10));
    }
}
