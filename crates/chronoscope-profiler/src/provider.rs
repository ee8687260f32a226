//! Domain-side metrics sources kept in step with the engine by adapters.

use std::collections::BTreeMap;
use std::sync::Arc;

use chronoscope_core::EntityId;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

/// Domain metrics keyed by name.
pub type DomainMetrics = BTreeMap<String, f64>;

/// A per-domain service that tracks its own view of entity metrics.
///
/// The engine and a provider are separate sources of truth; a
/// [`DomainAdapter`](crate::DomainAdapter) forwards to both.
pub trait DomainMetricsProvider: Send + Sync {
    /// An operation began on `entity` with the given domain counts.
    fn observe(&self, entity: EntityId, operation: &str, counts: &[(&str, f64)]);

    /// Forget everything recorded so far.
    fn reset_stats(&self);

    /// Watch `metric` of `entity` against `threshold`.
    fn register_alert(&self, entity: EntityId, metric: &str, threshold: f64);

    /// Current metrics of `entity`, if it was ever observed.
    fn metrics(&self, entity: EntityId) -> Option<DomainMetrics>;
}

#[derive(Debug, Default)]
struct EntityCounters {
    /// Operation name -> number of times it began.
    operations: BTreeMap<String, u64>,
    /// Last reported value of each count.
    gauges: BTreeMap<String, f64>,
    thresholds: BTreeMap<String, f64>,
}

/// In-memory provider counting operations and keeping the last domain counts.
///
/// `metrics` reports `"<operation>.count"` for every operation plus the last
/// value of every count passed to `observe`.
#[derive(Default)]
pub struct CounterProvider {
    entities: RwLock<HashMap<EntityId, Arc<Mutex<EntityCounters>>>>,
}

impl CounterProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, entity: EntityId) -> Arc<Mutex<EntityCounters>> {
        if let Some(slot) = self.entities.read().get(&entity) {
            return Arc::clone(slot);
        }
        Arc::clone(self.entities.write().entry(entity).or_default())
    }

    /// Metrics of `entity` currently above their registered threshold.
    #[must_use]
    pub fn breached(&self, entity: EntityId) -> Vec<String> {
        let Some(slot) = self.entities.read().get(&entity).cloned() else {
            return Vec::new();
        };
        let counters = slot.lock();
        counters
            .thresholds
            .iter()
            .filter(|(name, threshold)| {
                counters
                    .gauges
                    .get(*name)
                    .is_some_and(|value| *value > **threshold)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl DomainMetricsProvider for CounterProvider {
    fn observe(&self, entity: EntityId, operation: &str, counts: &[(&str, f64)]) {
        let slot = self.slot(entity);
        let mut counters = slot.lock();
        let key = operation.to_string();
        *counters.operations.entry(key).or_insert(0) += 1;
        for (name, value) in counts {
            counters.gauges.insert((*name).to_string(), *value);
        }
    }

    fn reset_stats(&self) {
        self.entities.write().clear();
    }

    fn register_alert(&self, entity: EntityId, metric: &str, threshold: f64) {
        if !threshold.is_finite() || threshold <= 0.0 {
            return;
        }
        self.slot(entity)
            .lock()
            .thresholds
            .insert(metric.to_string(), threshold);
    }

    fn metrics(&self, entity: EntityId) -> Option<DomainMetrics> {
        let slot = self.entities.read().get(&entity).cloned()?;
        let counters = slot.lock();
        let mut metrics: DomainMetrics = counters
            .operations
            .iter()
            .map(|(op, n)| (format!("{op}.count"), *n as f64))
            .collect();
        metrics.extend(counters.gauges.iter().map(|(k, v)| (k.clone(), *v)));
        Some(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_operations_and_keeps_last_gauges() {
        let provider = CounterProvider::new();
        let pool = EntityId(1);
        provider.observe(pool, "Acquire", &[("active", 1.0), ("available", 9.0)]);
        provider.observe(pool, "Acquire", &[("active", 2.0), ("available", 8.0)]);
        provider.observe(pool, "Release", &[("active", 1.0)]);

        let metrics = provider.metrics(pool).unwrap();
        assert_eq!(metrics["Acquire.count"], 2.0);
        assert_eq!(metrics["Release.count"], 1.0);
        assert_eq!(metrics["active"], 1.0);
        assert_eq!(metrics["available"], 8.0);
        assert!(provider.metrics(EntityId(2)).is_none());
    }

    #[test]
    fn thresholds_report_breaches() {
        let provider = CounterProvider::new();
        let pool = EntityId(3);
        provider.register_alert(pool, "active", 4.0);
        provider.register_alert(pool, "ignored", 0.0);
        provider.observe(pool, "Acquire", &[("active", 4.0)]);
        assert!(provider.breached(pool).is_empty());

        provider.observe(pool, "Acquire", &[("active", 5.0)]);
        assert_eq!(provider.breached(pool), vec!["active".to_string()]);
    }

    #[test]
    fn reset_forgets_entities() {
        let provider = CounterProvider::new();
        provider.observe(EntityId(1), "Publish", &[]);
        provider.reset_stats();
        assert!(provider.metrics(EntityId(1)).is_none());
    }
}
