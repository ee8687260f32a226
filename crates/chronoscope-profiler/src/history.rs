//! Bounded per-tag history of recent durations.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chronoscope_core::constants::DEFAULT_HISTORY_CAPACITY;
use chronoscope_core::Tag;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use crate::ring_buffer::RingBuffer;

/// Keeps the last `capacity` durations per key, oldest evicted first.
///
/// Rings are allocated lazily on a key's first sample.
pub struct HistoryBuffer<K = Tag> {
    capacity: usize,
    rings: RwLock<HashMap<K, Arc<Mutex<RingBuffer<Duration>>>>>,
}

impl<K: Hash + Eq + Clone> Default for HistoryBuffer<K> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl<K: Hash + Eq + Clone> HistoryBuffer<K> {
    /// Create a buffer retaining `capacity` samples per key (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rings: RwLock::new(HashMap::new()),
        }
    }

    /// Per-key capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample, silently evicting the oldest one when full.
    pub fn append(&self, key: &K, duration: Duration) {
        let ring = self.rings.read().get(key).cloned();
        let ring = ring.unwrap_or_else(|| {
            let fresh = || Arc::new(Mutex::new(RingBuffer::with_capacity(self.capacity)));
            let mut rings = self.rings.write();
            let slot = rings.entry(key.clone()).or_insert_with(fresh);
            Arc::clone(slot)
        });
        ring.lock().push(duration);
    }

    /// Retained samples for `key`, oldest first. Empty if never sampled.
    #[must_use]
    pub fn history(&self, key: &K) -> Vec<Duration> {
        let ring = self.rings.read().get(key).cloned();
        ring.map_or_else(Vec::new, |ring| {
            let retained = ring.lock().to_vec();
            retained
        })
    }

    /// Drop the history of every key.
    pub fn reset(&self) {
        let old = std::mem::take(&mut *self.rings.write());
        drop(old);
    }
}
