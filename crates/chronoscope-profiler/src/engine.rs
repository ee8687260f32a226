//! The profiling engine: session factory and completion subscriber.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use chronoscope_bus::{BusError, EventBus, HandlerResult, SubscriptionId};
use chronoscope_core::constants::SAMPLE_CATEGORY;
use chronoscope_core::{EntityContext, EntityId, Tag};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::aggregator::{duration_ns, ns_to_ms, Counters, MetricsAggregator, MetricsSnapshot};
use crate::alerts::{AlertKey, AlertRegistry};
use crate::cache::{CacheStats, MetricsCache};
use crate::config::ProfilerConfig;
use crate::events::{AlertTriggered, SessionCompleted};
use crate::history::HistoryBuffer;
use crate::session::{Emitter, Session};

/// Aggregated view of everything recorded against one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMetrics {
    /// Entity the metrics belong to.
    pub entity: EntityId,
    /// Last logical name seen for the entity.
    pub name: Option<Arc<str>>,
    /// Per-tag timings of sessions that named the entity.
    pub operations: BTreeMap<Tag, MetricsSnapshot>,
    /// Last value of every custom metric recorded against the entity.
    pub metrics: BTreeMap<Arc<str>, f64>,
}

/// Everything recorded against one entity, updated as one unit.
#[derive(Debug, Default)]
struct EntityRecord {
    name: Option<Arc<str>>,
    operations: HashMap<Tag, Counters>,
    last: BTreeMap<Arc<str>, f64>,
}

/// State updated by the completion subscriber.
struct EngineState {
    track_percentiles: bool,
    /// Held shared by every update and read, exclusively by reset.
    epoch: RwLock<()>,
    aggregator: MetricsAggregator<Tag>,
    history: HistoryBuffer<Tag>,
    alerts: AlertRegistry,
    entities: RwLock<HashMap<EntityId, Arc<Mutex<EntityRecord>>>>,
    cache: MetricsCache<EntityMetrics>,
}

impl EngineState {
    fn new(config: &ProfilerConfig) -> Self {
        Self {
            track_percentiles: config.track_percentiles,
            epoch: RwLock::new(()),
            aggregator: MetricsAggregator::new(),
            history: HistoryBuffer::new(config.history_capacity),
            alerts: AlertRegistry::new(),
            entities: RwLock::new(HashMap::new()),
            cache: MetricsCache::new(),
        }
    }

    fn on_completed(&self, event: &SessionCompleted, bus: &Weak<EventBus>) -> HandlerResult {
        let alerts = {
            let _epoch = self.epoch.read();
            self.aggregator.add_sample(&event.tag, event.duration);
            self.history.append(&event.tag, event.duration);
            if let Some(entity) = &event.entity {
                self.record_entity(entity, event);
            }
            self.evaluate_alerts(event)
        };

        if let Some(entity) = event.entity_id() {
            self.cache.invalidate(entity);
        }

        if alerts.is_empty() {
            return Ok(());
        }
        let Some(bus) = bus.upgrade() else {
            return Ok(());
        };
        let mut first_error: Option<BusError> = None;
        for alert in alerts {
            tracing::debug!(
                "Alert {}: {:.3} > {:.3}",
                alert.key,
                alert.value,
                alert.threshold
            );
            if let Err(e) = bus.publish(alert) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), |e| Err(e.into()))
    }

    fn record_entity(&self, entity: &EntityContext, event: &SessionCompleted) {
        let slot = self.entities.read().get(&entity.id).cloned();
        let slot = slot.unwrap_or_else(|| {
            let mut entities = self.entities.write();
            let slot = entities.entry(entity.id).or_default();
            Arc::clone(slot)
        });

        let mut record = slot.lock();
        if entity.name.is_some() {
            record.name.clone_from(&entity.name);
        }
        record
            .operations
            .entry(event.tag.clone())
            .or_default()
            .record(duration_ns(event.duration));
        for (name, value) in &event.custom_metrics {
            record.last.insert(Arc::clone(name), *value);
        }
    }

    fn evaluate_alerts(&self, event: &SessionCompleted) -> Vec<AlertTriggered> {
        let mut fired = Vec::new();
        if self.alerts.is_empty() {
            return fired;
        }

        let tag = &event.tag;
        let session_key = AlertKey::Session(tag.clone());
        fired.extend(self.alerts.evaluate(&session_key, event.duration_ms()));

        let average_key = AlertKey::Average(tag.clone());
        if self.alerts.threshold(&average_key).is_some() {
            if let Some(counters) = self.aggregator.counters(tag) {
                let average_ms = ns_to_ms(counters.avg_ns());
                fired.extend(self.alerts.evaluate(&average_key, average_ms));
            }
        }

        for (name, value) in &event.custom_metrics {
            let key = AlertKey::Metric {
                tag: tag.clone(),
                name: Arc::clone(name),
            };
            fired.extend(self.alerts.evaluate(&key, *value));

            if let Some(entity) = event.entity_id() {
                let key = AlertKey::Entity {
                    entity,
                    name: Arc::clone(name),
                };
                fired.extend(self.alerts.evaluate(&key, *value));
            }
        }
        fired
    }

    fn snapshot(&self, tag: &Tag) -> MetricsSnapshot {
        let snapshot = self.aggregator.snapshot(tag);
        if self.track_percentiles && !snapshot.is_empty() {
            snapshot.with_percentiles(&self.history.history(tag))
        } else {
            snapshot
        }
    }

    /// Called with the entity's cache slot locked, never under the epoch.
    fn compute_entity_metrics(&self, entity: EntityId) -> EntityMetrics {
        let _epoch = self.epoch.read();
        let mut metrics = EntityMetrics {
            entity,
            ..EntityMetrics::default()
        };
        let Some(slot) = self.entities.read().get(&entity).cloned() else {
            return metrics;
        };

        let record = slot.lock();
        metrics.name.clone_from(&record.name);
        metrics.operations = record
            .operations
            .iter()
            .map(|(tag, c)| (tag.clone(), MetricsSnapshot::from(*c)))
            .collect();
        metrics.metrics.clone_from(&record.last);
        metrics
    }

    fn reset(&self) {
        let _epoch = self.epoch.write();
        self.aggregator.reset();
        self.history.reset();
        self.alerts.reset();
        let old = std::mem::take(&mut *self.entities.write());
        drop(old);
        self.cache.clear();
    }
}

/// Times sessions and aggregates their completions.
///
/// The profiler subscribes to its own [`SessionCompleted`] stream on the bus
/// and is the only writer of its metrics. Other subsystems may subscribe to
/// the same bus to observe completions and [`AlertTriggered`] events.
pub struct Profiler {
    emitter: Arc<Emitter>,
    state: Arc<EngineState>,
    subscription: SubscriptionId,
    config: ProfilerConfig,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new(ProfilerConfig::default())
    }
}

impl Profiler {
    /// Create a profiler with its own bus.
    #[must_use]
    pub fn new(config: ProfilerConfig) -> Self {
        Self::with_bus(config, Arc::new(EventBus::new()))
    }

    /// Create a profiler publishing on a shared bus.
    ///
    /// The aggregation subscriber is registered here, so it runs before any
    /// handler subscribed to the bus afterwards.
    #[must_use]
    pub fn with_bus(config: ProfilerConfig, bus: Arc<EventBus>) -> Self {
        let state = Arc::new(EngineState::new(&config));

        let subscriber = Arc::clone(&state);
        let weak_bus = Arc::downgrade(&bus);
        let handler = move |event: &SessionCompleted| subscriber.on_completed(event, &weak_bus);
        let subscription = bus.subscribe(handler);

        Self {
            emitter: Arc::new(Emitter::new(bus, config.enabled)),
            state,
            subscription,
            config,
        }
    }

    /// The bus completions and alerts are published on.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        self.emitter.bus()
    }

    /// Configuration the profiler was built with.
    #[must_use]
    pub const fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Enable session timing and publication.
    pub fn start_profiling(&self) {
        self.emitter.set_enabled(true);
        tracing::info!("Profiling started");
    }

    /// Disable session timing and publication.
    pub fn stop_profiling(&self) {
        self.emitter.set_enabled(false);
        tracing::info!("Profiling stopped");
    }

    /// Check the global enable gate.
    #[must_use]
    pub fn is_profiling(&self) -> bool {
        self.emitter.is_enabled()
    }

    /// Create a session that is configured but not yet timing.
    pub fn create_session(&self, tag: Tag) -> Session {
        if !self.is_profiling() {
            return Session::inert();
        }
        Session::created(tag, Arc::clone(&self.emitter))
    }

    /// Begin timing an operation under `tag`.
    pub fn begin_scope(&self, tag: Tag) -> Session {
        let mut session = self.create_session(tag);
        session.start();
        session
    }

    /// Begin timing under `(category, name)`. Blank parts skip profiling.
    pub fn begin_scope_in(&self, category: &str, name: &str) -> Session {
        if !self.is_profiling() {
            return Session::inert();
        }
        match Tag::try_new(category, name) {
            Ok(tag) => self.begin_scope(tag),
            Err(e) => {
                tracing::debug!("Skipping profiling: {}", e);
                Session::inert()
            }
        }
    }

    /// Begin timing a named sample in the default category.
    pub fn begin_sample(&self, name: &str) -> Session {
        self.begin_scope_in(SAMPLE_CATEGORY, name)
    }

    /// Begin timing with entity context and an operation type.
    pub fn begin_with_context(
        &self,
        tag: Tag,
        entity: Option<EntityContext>,
        operation: Option<Arc<str>>,
    ) -> Session {
        let mut session = self.create_session(tag);
        if let Some(entity) = entity {
            session = session.with_entity(entity);
        }
        if let Some(operation) = operation {
            session = session.with_operation(operation);
        }
        session.start();
        session
    }

    /// Time `action` under `tag`.
    ///
    /// The session is disposed even if `action` panics; the panic continues
    /// unwinding unchanged.
    pub fn profile<R>(&self, tag: Tag, action: impl FnOnce() -> R) -> R {
        let _session = self.begin_scope(tag);
        action()
    }

    /// Report a duration measured by the caller.
    ///
    /// Publishes a completion exactly as a disposed session would.
    pub fn record_duration(&self, tag: Tag, duration: Duration) {
        if !self.is_profiling() {
            return;
        }
        self.emitter.emit(SessionCompleted {
            session_id: 0,
            tag,
            entity: None,
            operation: None,
            duration,
            custom_metrics: Vec::new(),
            timestamp: SystemTime::now(),
        });
    }

    /// Snapshot for `tag`; empty if never sampled.
    #[must_use]
    pub fn metrics(&self, tag: &Tag) -> MetricsSnapshot {
        let _epoch = self.state.epoch.read();
        self.state.snapshot(tag)
    }

    /// Snapshots of every tracked tag, ordered by tag.
    #[must_use]
    pub fn all_metrics(&self) -> BTreeMap<Tag, MetricsSnapshot> {
        let _epoch = self.state.epoch.read();
        self.state
            .aggregator
            .all_counters()
            .into_iter()
            .map(|(tag, counters)| {
                let snapshot = MetricsSnapshot::from(counters);
                let snapshot = if self.state.track_percentiles {
                    snapshot.with_percentiles(&self.state.history.history(&tag))
                } else {
                    snapshot
                };
                (tag, snapshot)
            })
            .collect()
    }

    /// Retained durations for `tag`, oldest first.
    #[must_use]
    pub fn history(&self, tag: &Tag) -> Vec<Duration> {
        let _epoch = self.state.epoch.read();
        self.state.history.history(tag)
    }

    /// Metrics of sessions that named `entity`, served from the cache.
    #[must_use]
    pub fn entity_metrics(&self, entity: EntityId) -> EntityMetrics {
        self.state
            .cache
            .get_or_compute(entity, || self.state.compute_entity_metrics(entity))
    }

    /// Entity cache hit/miss counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.state.cache.stats()
    }

    /// Alert when a single session of `tag` takes longer than `threshold_ms`.
    pub fn register_session_alert(&self, tag: Tag, threshold_ms: f64) -> bool {
        self.state.alerts.register(AlertKey::Session(tag), threshold_ms)
    }

    /// Alert when the running average of `tag` exceeds `threshold_ms`.
    pub fn register_metric_alert(&self, tag: Tag, threshold_ms: f64) -> bool {
        self.state.alerts.register(AlertKey::Average(tag), threshold_ms)
    }

    /// Alert when a custom metric recorded in a session of `tag` exceeds `threshold`.
    pub fn register_custom_metric_alert(&self, tag: Tag, name: &str, threshold: f64) -> bool {
        self.state.alerts.register(
            AlertKey::Metric {
                tag,
                name: Arc::from(name),
            },
            threshold,
        )
    }

    /// Alert when a custom metric recorded against `entity` exceeds `threshold`.
    pub fn register_entity_alert(&self, entity: EntityId, name: &str, threshold: f64) -> bool {
        self.state.alerts.register(
            AlertKey::Entity {
                entity,
                name: Arc::from(name),
            },
            threshold,
        )
    }

    /// Remove an alert rule.
    pub fn unregister_alert(&self, key: &AlertKey) -> bool {
        self.state.alerts.unregister(key)
    }

    /// Subscribe to alerts published by this profiler's bus.
    pub fn subscribe_alerts<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&AlertTriggered) -> HandlerResult + Send + Sync + 'static,
    {
        self.bus().subscribe(handler)
    }

    /// Clear aggregated metrics, history and alert rules in one step.
    pub fn reset_stats(&self) {
        self.state.reset();
        tracing::debug!("Profiler statistics reset");
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        self.bus().unsubscribe(self.subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn alerts_of(profiler: &Profiler) -> Arc<Mutex<Vec<AlertTriggered>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        profiler.subscribe_alerts(move |alert| {
            sink.lock().push(alert.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn aggregates_recorded_durations() {
        let profiler = Profiler::default();
        let tag = Tag::new("Pool", "Acquire");
        for d in [4, 8, 1, 7] {
            profiler.record_duration(tag.clone(), ms(d));
        }

        let snapshot = profiler.metrics(&tag);
        assert_eq!(snapshot.count, 4);
        assert_eq!(snapshot.total, ms(20));
        assert_eq!(snapshot.min, ms(1));
        assert_eq!(snapshot.max, ms(8));
        assert_relative_eq!(snapshot.avg_ms(), 5.0);
        assert_eq!(profiler.history(&tag), vec![ms(4), ms(8), ms(1), ms(7)]);
    }

    #[test]
    fn disposed_session_updates_metrics_once() {
        let profiler = Profiler::default();
        let tag = Tag::new("Bus", "Publish");

        let mut session = profiler.begin_scope(tag.clone());
        session.dispose();
        session.dispose();
        drop(session);

        assert_eq!(profiler.metrics(&tag).count, 1);
    }

    #[test]
    fn alert_fires_once_above_threshold() {
        let profiler = Profiler::default();
        let alerts = alerts_of(&profiler);
        let tag = Tag::new("Pool", "Acquire");
        assert!(profiler.register_session_alert(tag.clone(), 5.0));

        for d in [1, 2, 3, 10] {
            profiler.record_duration(tag.clone(), ms(d));
        }

        let alerts = alerts.lock();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].key, AlertKey::Session(tag));
        assert_relative_eq!(alerts[0].value, 10.0);
        assert_relative_eq!(alerts[0].threshold, 5.0);
    }

    #[test]
    fn value_at_threshold_does_not_alert() {
        let profiler = Profiler::default();
        let alerts = alerts_of(&profiler);
        let tag = Tag::new("Pool", "Acquire");
        profiler.register_session_alert(tag.clone(), 5.0);

        profiler.record_duration(tag, ms(5));
        assert!(alerts.lock().is_empty());
    }

    #[test]
    fn sub_millisecond_value_at_threshold_does_not_alert() {
        let profiler = Profiler::default();
        let alerts = alerts_of(&profiler);
        let tag = Tag::new("Pool", "Acquire");

        for micros in 1..=2_000u64 {
            profiler.register_session_alert(tag.clone(), micros as f64 / 1_000.0);
            profiler.record_duration(tag.clone(), Duration::from_micros(micros));
        }
        assert!(alerts.lock().is_empty());

        profiler.register_session_alert(tag.clone(), 0.009);
        profiler.record_duration(tag, Duration::from_nanos(9_001));
        assert_eq!(alerts.lock().len(), 1);
    }

    #[test]
    fn average_alert_tracks_running_mean() {
        let profiler = Profiler::default();
        let alerts = alerts_of(&profiler);
        let tag = Tag::new("Ser", "Serialize");
        profiler.register_metric_alert(tag.clone(), 5.0);

        profiler.record_duration(tag.clone(), ms(2));
        profiler.record_duration(tag.clone(), ms(6));
        assert!(alerts.lock().is_empty());
        profiler.record_duration(tag.clone(), ms(10));

        let alerts = alerts.lock();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].key, AlertKey::Average(tag));
        assert_relative_eq!(alerts[0].value, 6.0);
    }

    #[test]
    fn tag_and_entity_rules_fire_independently() {
        let profiler = Profiler::default();
        let alerts = alerts_of(&profiler);
        let tag = Tag::new("Pool", "Acquire");
        profiler.register_custom_metric_alert(tag.clone(), "active", 10.0);
        profiler.register_entity_alert(EntityId(1), "active", 3.0);

        let mut session = profiler.begin_with_context(
            tag,
            Some(EntityContext::named(EntityId(1), "bullets")),
            None,
        );
        session.record_metric("active", 12.0);
        session.dispose();

        let alerts = alerts.lock();
        assert_eq!(alerts.len(), 2);
        let is_metric = |a: &AlertTriggered| matches!(a.key, AlertKey::Metric { .. });
        assert!(alerts.iter().any(is_metric));
        let entities: Vec<EntityId> = alerts
            .iter()
            .filter_map(|a| match a.key {
                AlertKey::Entity { entity, .. } => Some(entity),
                _ => None,
            })
            .collect();
        assert_eq!(entities, [EntityId(1)]);
    }

    #[test]
    fn reset_clears_metrics_history_and_alerts() {
        let profiler = Profiler::default();
        let alerts = alerts_of(&profiler);
        let tag = Tag::new("Pool", "Acquire");
        profiler.register_session_alert(tag.clone(), 1.0);
        profiler.record_duration(tag.clone(), ms(5));
        assert_eq!(alerts.lock().len(), 1);

        let mut session = profiler.begin_with_context(
            Tag::new("Pool", "Release"),
            Some(EntityContext::named(EntityId(3), "bullets")),
            None,
        );
        session.record_metric("active", 4.0);
        drop(session);
        assert_eq!(profiler.entity_metrics(EntityId(3)).operations.len(), 1);

        profiler.reset_stats();

        assert!(profiler.metrics(&tag).is_empty());
        assert!(profiler.history(&tag).is_empty());
        assert!(profiler.all_metrics().is_empty());
        assert_eq!(profiler.cache_stats(), CacheStats::default());
        let entity = profiler.entity_metrics(EntityId(3));
        assert!(entity.name.is_none());
        assert!(entity.operations.is_empty());
        assert!(entity.metrics.is_empty());

        profiler.record_duration(tag, ms(5));
        assert_eq!(alerts.lock().len(), 1);
    }

    #[test]
    fn entity_reads_never_observe_partial_reset() {
        let profiler = Profiler::default();
        let tag = Tag::new("Pool", "Acquire");
        let entity = EntityContext::named(EntityId(1), "bullets");
        let done = std::sync::atomic::AtomicBool::new(false);

        crossbeam::thread::scope(|s| {
            s.spawn(|_| {
                for _ in 0..2_000 {
                    let context = Some(entity.clone());
                    let mut session = profiler.begin_with_context(tag.clone(), context, None);
                    session.record_metric("active", 1.0);
                    drop(session);
                    profiler.reset_stats();
                }
                done.store(true, std::sync::atomic::Ordering::Release);
            });
            s.spawn(|_| {
                while !done.load(std::sync::atomic::Ordering::Acquire) {
                    let metrics = profiler.entity_metrics(EntityId(1));
                    assert_eq!(metrics.operations.is_empty(), metrics.metrics.is_empty());
                    assert_eq!(metrics.operations.is_empty(), metrics.name.is_none());
                }
            });
        })
        .unwrap();
    }

    #[test]
    fn disabled_profiler_records_nothing() {
        let profiler = Profiler::new(ProfilerConfig::default().with_enabled(false));
        let published = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&published);
        profiler.bus().subscribe(move |_: &SessionCompleted| {
            *counter.lock() += 1;
            Ok(())
        });

        for _ in 0..10 {
            let session = profiler.begin_scope(Tag::new("Pool", "Acquire"));
            assert!(session.is_inert());
            drop(profiler.begin_sample("frame"));
        }
        profiler.record_duration(Tag::new("Pool", "Acquire"), ms(1));

        assert_eq!(*published.lock(), 0);
        assert!(profiler.all_metrics().is_empty());
    }

    #[test]
    fn stop_and_start_gate_sessions() {
        let profiler = Profiler::default();
        let tag = Tag::new("Pool", "Acquire");

        let running = profiler.begin_scope(tag.clone());
        profiler.stop_profiling();
        assert!(!profiler.is_profiling());
        drop(running);
        drop(profiler.begin_scope(tag.clone()));
        assert!(profiler.metrics(&tag).is_empty());

        profiler.start_profiling();
        drop(profiler.begin_scope(tag.clone()));
        assert_eq!(profiler.metrics(&tag).count, 1);
    }

    #[test]
    fn blank_names_skip_profiling() {
        let profiler = Profiler::default();
        assert!(profiler.begin_sample("").is_inert());
        assert!(profiler.begin_scope_in("Pool", " ").is_inert());
        assert!(profiler.all_metrics().is_empty());
    }

    #[test]
    fn profile_disposes_on_panic() {
        let profiler = Profiler::default();
        let tag = Tag::new("Coroutine", "Resume");

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            profiler.profile(tag.clone(), || panic!("work failed"))
        }));

        assert!(result.is_err());
        assert_eq!(profiler.metrics(&tag).count, 1);
        assert_eq!(profiler.profile(tag.clone(), || 7), 7);
        assert_eq!(profiler.metrics(&tag).count, 2);
    }

    #[test]
    fn entity_metrics_are_cached_until_invalidated() {
        let profiler = Profiler::default();
        let tag = Tag::new("Pool", "Acquire");
        let entity = EntityContext::named(EntityId(9), "bullets");

        let mut session = profiler.begin_with_context(tag.clone(), Some(entity.clone()), None);
        session.record_metric("active", 2.0);
        drop(session);

        let first = profiler.entity_metrics(EntityId(9));
        assert_eq!(first.name.as_deref(), Some("bullets"));
        assert_eq!(first.operations[&tag].count, 1);
        assert_eq!(first.metrics.get("active").copied(), Some(2.0));

        let again = profiler.entity_metrics(EntityId(9));
        assert_eq!(again, first);
        let stats = profiler.cache_stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));

        drop(profiler.begin_with_context(tag.clone(), Some(entity), None));
        let updated = profiler.entity_metrics(EntityId(9));
        assert_eq!(updated.operations[&tag].count, 2);
        assert_eq!(profiler.cache_stats().misses, 2);
    }

    #[test]
    fn entity_ids_do_not_fragment_tags() {
        let profiler = Profiler::default();
        let tag = Tag::new("Pool", "Acquire");
        for id in 0..50 {
            drop(profiler.begin_with_context(
                tag.clone(),
                Some(EntityContext::new(EntityId(id))),
                None,
            ));
        }
        let all = profiler.all_metrics();
        assert_eq!(all.len(), 1);
        assert_eq!(all[&tag].count, 50);
    }

    #[test]
    fn percentiles_follow_config() {
        let tag = Tag::new("Bus", "Publish");

        let with = Profiler::default();
        for d in 1..=20 {
            with.record_duration(tag.clone(), ms(d));
        }
        assert_eq!(with.metrics(&tag).p95, Some(ms(19)));

        let without = Profiler::new(ProfilerConfig::default().with_percentiles(false));
        without.record_duration(tag.clone(), ms(3));
        assert_eq!(without.metrics(&tag).p95, None);
    }

    #[test]
    fn concurrent_sessions_lose_no_updates() {
        let profiler = Profiler::default();
        let tag = Tag::new("Pool", "Acquire");

        crossbeam::thread::scope(|s| {
            for _ in 0..2 {
                s.spawn(|_| {
                    for _ in 0..1_000 {
                        drop(profiler.begin_scope(tag.clone()));
                    }
                });
            }
        })
        .unwrap();

        assert_eq!(profiler.metrics(&tag).count, 2_000);
        assert_eq!(profiler.history(&tag).len(), 100);
    }

    #[test]
    fn external_subscribers_see_completions_after_aggregation() {
        let profiler = Arc::new(Profiler::default());
        let tag = Tag::new("Log", "Write");
        let observed = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&profiler);
        let sink = Arc::clone(&observed);
        profiler.bus().subscribe(move |event: &SessionCompleted| {
            if let Some(profiler) = weak.upgrade() {
                sink.lock().push(profiler.metrics(&event.tag).count);
            }
            Ok(())
        });

        profiler.record_duration(tag.clone(), ms(1));
        profiler.record_duration(tag, ms(1));
        assert_eq!(*observed.lock(), vec![1, 2]);
    }

    #[test]
    fn dropping_profiler_unsubscribes() {
        let bus = Arc::new(EventBus::new());
        let profiler = Profiler::with_bus(ProfilerConfig::default(), Arc::clone(&bus));
        assert_eq!(bus.subscriber_count::<SessionCompleted>(), 1);
        drop(profiler);
        assert_eq!(bus.subscriber_count::<SessionCompleted>(), 0);
    }
}
