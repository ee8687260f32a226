//! Running duration statistics per key.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chronoscope_core::Tag;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Convert a duration to whole nanoseconds, saturating at `u64::MAX`.
#[inline]
pub(crate) fn duration_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[inline]
pub(crate) fn ns_to_ms(ns: u64) -> f64 {
    ns as f64 / 1_000_000.0
}

/// Raw counters for one key. Mutated only under the key's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    /// Number of samples.
    pub count: u64,
    /// Sum of all samples in nanoseconds.
    pub total_ns: u64,
    /// Smallest sample in nanoseconds (`u64::MAX` while empty).
    pub min_ns: u64,
    /// Largest sample in nanoseconds.
    pub max_ns: u64,
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    /// Empty counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: 0,
            total_ns: 0,
            min_ns: u64::MAX,
            max_ns: 0,
        }
    }

    /// Record a new timing.
    pub fn record(&mut self, duration_ns: u64) {
        self.count += 1;
        self.total_ns = self.total_ns.saturating_add(duration_ns);
        self.min_ns = self.min_ns.min(duration_ns);
        self.max_ns = self.max_ns.max(duration_ns);
    }

    /// Average in nanoseconds, zero when empty.
    #[must_use]
    pub const fn avg_ns(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_ns / self.count
        }
    }
}

/// Read-only view of the aggregated metrics for one key.
///
/// Derived from `Counters` on read and never mutated directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Number of samples.
    pub count: u64,
    /// Sum of all samples.
    pub total: Duration,
    /// Smallest sample (zero when empty).
    pub min: Duration,
    /// Largest sample.
    pub max: Duration,
    /// `total / count`, zero when empty.
    pub average: Duration,
    /// 95th percentile over the retained history.
    pub p95: Option<Duration>,
    /// 99th percentile over the retained history.
    pub p99: Option<Duration>,
}

impl From<Counters> for MetricsSnapshot {
    fn from(counters: Counters) -> Self {
        if counters.count == 0 {
            return Self::default();
        }
        Self {
            count: counters.count,
            total: Duration::from_nanos(counters.total_ns),
            min: Duration::from_nanos(counters.min_ns),
            max: Duration::from_nanos(counters.max_ns),
            average: Duration::from_nanos(counters.avg_ns()),
            p95: None,
            p99: None,
        }
    }
}

impl MetricsSnapshot {
    /// Fill in p95/p99 from a window of recent samples.
    #[must_use]
    pub fn with_percentiles(mut self, recent: &[Duration]) -> Self {
        if recent.is_empty() {
            return self;
        }
        let mut sorted = recent.to_vec();
        sorted.sort_unstable();
        self.p95 = Some(nearest_rank(&sorted, 95));
        self.p99 = Some(nearest_rank(&sorted, 99));
        self
    }

    /// Check if no samples were recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Get average in milliseconds.
    #[must_use]
    pub fn avg_ms(&self) -> f64 {
        ns_to_ms(duration_ns(self.average))
    }

    /// Get minimum in milliseconds.
    #[must_use]
    pub fn min_ms(&self) -> f64 {
        ns_to_ms(duration_ns(self.min))
    }

    /// Get maximum in milliseconds.
    #[must_use]
    pub fn max_ms(&self) -> f64 {
        ns_to_ms(duration_ns(self.max))
    }

    /// Get total in milliseconds.
    #[must_use]
    pub fn total_ms(&self) -> f64 {
        ns_to_ms(duration_ns(self.total))
    }
}

/// Nearest-rank percentile over an ascending, non-empty slice.
fn nearest_rank(sorted: &[Duration], pct: usize) -> Duration {
    let rank = (sorted.len() * pct).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

/// Maintains count/total/min/max per key.
///
/// Each key has its own mutex, so samples for different keys never contend;
/// the outer map lock is only taken exclusively to insert a new key or reset.
pub struct MetricsAggregator<K = Tag> {
    entries: RwLock<HashMap<K, Arc<Mutex<Counters>>>>,
}

impl<K: Hash + Eq + Clone> Default for MetricsAggregator<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone> MetricsAggregator<K> {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &K) -> Arc<Mutex<Counters>> {
        if let Some(slot) = self.entries.read().get(key) {
            return Arc::clone(slot);
        }
        let mut entries = self.entries.write();
        let slot = entries.entry(key.clone()).or_default();
        Arc::clone(slot)
    }

    /// Record one sample for `key`.
    pub fn add_sample(&self, key: &K, duration: Duration) {
        self.slot(key).lock().record(duration_ns(duration));
    }

    /// Current counters for `key`, if it was ever sampled.
    #[must_use]
    pub fn counters(&self, key: &K) -> Option<Counters> {
        let slot = self.entries.read().get(key).cloned()?;
        let counters = *slot.lock();
        Some(counters)
    }

    /// Snapshot for `key`; empty if it was never sampled.
    #[must_use]
    pub fn snapshot(&self, key: &K) -> MetricsSnapshot {
        self.counters(key)
            .map(MetricsSnapshot::from)
            .unwrap_or_default()
    }

    /// Counters for every key.
    #[must_use]
    pub fn all_counters(&self) -> Vec<(K, Counters)> {
        let entries = self.entries.read();
        entries
            .iter()
            .map(|(key, slot)| (key.clone(), *slot.lock()))
            .collect()
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Forget every key.
    ///
    /// The map is swapped under the exclusive lock, so a reader sees either
    /// the old counters or none at all.
    pub fn reset(&self) {
        let old = std::mem::take(&mut *self.entries.write());
        drop(old);
    }
}
