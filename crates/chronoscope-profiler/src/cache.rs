//! Per-entity snapshot cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chronoscope_core::EntityId;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

#[derive(Debug)]
struct Slot<V> {
    /// Bumped on every invalidation. Diagnostic only; freshness is decided
    /// by `cached` alone, since invalidation waits on the slot lock.
    version: u64,
    cached: Option<V>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            version: 0,
            cached: None,
        }
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from the cache.
    pub hits: u64,
    /// Reads that recomputed.
    pub misses: u64,
}

/// Caches one computed value per entity until an event names that entity.
///
/// Entries are never refreshed proactively: a miss recomputes once and
/// stores the result. Each entity has its own lock.
pub struct MetricsCache<V> {
    slots: RwLock<HashMap<EntityId, Arc<Mutex<Slot<V>>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> Default for MetricsCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> MetricsCache<V> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached value for `entity`, or the result of `compute` stored for next time.
    pub fn get_or_compute(&self, entity: EntityId, compute: impl FnOnce() -> V) -> V {
        let slot = self.slots.read().get(&entity).cloned();
        let slot = slot.unwrap_or_else(|| {
            let mut slots = self.slots.write();
            let slot = slots.entry(entity).or_default();
            Arc::clone(slot)
        });

        let mut slot = slot.lock();
        if let Some(value) = &slot.cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return value.clone();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let fresh = compute();
        slot.cached = Some(fresh.clone());
        fresh
    }

    /// Mark the entry for `entity` stale.
    pub fn invalidate(&self, entity: EntityId) {
        let slot = self.slots.read().get(&entity).cloned();
        if let Some(slot) = slot {
            let mut slot = slot.lock();
            slot.version += 1;
            slot.cached = None;
        }
    }

    /// Number of invalidations seen by `entity`'s entry, if it exists.
    #[must_use]
    pub fn version(&self, entity: EntityId) -> Option<u64> {
        let slot = self.slots.read().get(&entity).cloned()?;
        let version = slot.lock().version;
        Some(version)
    }

    /// Check whether `entity` currently has a fresh value.
    #[must_use]
    pub fn is_cached(&self, entity: EntityId) -> bool {
        let slot = self.slots.read().get(&entity).cloned();
        slot.is_some_and(|slot| {
            let fresh = slot.lock().cached.is_some();
            fresh
        })
    }

    /// Hit/miss counters since creation or the last [`clear`](Self::clear).
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop every entry and zero the hit/miss counters.
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.slots.write());
        drop(old);
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn miss_then_hit() {
        let cache = MetricsCache::new();
        let computed = Cell::new(0);
        let compute = || {
            computed.set(computed.get() + 1);
            42u32
        };

        assert_eq!(cache.get_or_compute(EntityId(1), compute), 42);
        assert_eq!(cache.get_or_compute(EntityId(1), compute), 42);
        assert_eq!(computed.get(), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn invalidate_forces_one_recompute() {
        let cache = MetricsCache::new();
        cache.get_or_compute(EntityId(7), || 1u32);
        assert!(cache.is_cached(EntityId(7)));

        cache.invalidate(EntityId(7));
        assert!(!cache.is_cached(EntityId(7)));
        assert_eq!(cache.version(EntityId(7)), Some(1));

        assert_eq!(cache.get_or_compute(EntityId(7), || 2u32), 2);
        assert_eq!(cache.get_or_compute(EntityId(7), || 3u32), 2);
    }

    #[test]
    fn invalidation_is_per_entity() {
        let cache = MetricsCache::new();
        cache.get_or_compute(EntityId(1), || "a");
        cache.get_or_compute(EntityId(2), || "b");

        cache.invalidate(EntityId(1));

        assert!(!cache.is_cached(EntityId(1)));
        assert!(cache.is_cached(EntityId(2)));
    }

    #[test]
    fn invalidating_unknown_entity_is_noop() {
        let cache: MetricsCache<u32> = MetricsCache::new();
        cache.invalidate(EntityId(99));
        assert_eq!(cache.version(EntityId(99)), None);
    }

    #[test]
    fn clear_drops_entries() {
        let cache = MetricsCache::new();
        cache.get_or_compute(EntityId(1), || 5u32);
        cache.clear();
        assert!(!cache.is_cached(EntityId(1)));
        assert_eq!(cache.stats(), CacheStats::default());
        assert_eq!(cache.get_or_compute(EntityId(1), || 6u32), 6);
    }
}
