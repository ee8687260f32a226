//! Generic domain adapter over the engine.
//!
//! Every domain (pools, message buses, serializers, coroutines, logging) is
//! one [`DomainDescriptor`] plus a thin wrapper of sugar methods over
//! [`DomainAdapter::begin_scope`]. None of them keep aggregation state.

use std::sync::Arc;

use chronoscope_core::{EntityContext, EntityId, Tag};

use crate::aggregator::MetricsSnapshot;
use crate::engine::{EntityMetrics, Profiler};
use crate::provider::{DomainMetrics, DomainMetricsProvider};
use crate::session::Session;

/// Static description of a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainDescriptor {
    /// Tag category for every session of the domain.
    pub category: &'static str,
    /// Entity name used when the caller has none.
    pub default_entity: Option<&'static str>,
}

/// Engine and provider view of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEntityMetrics {
    /// What the engine aggregated from completed sessions.
    pub engine: EntityMetrics,
    /// What the domain provider reports, if one is attached.
    pub domain: Option<DomainMetrics>,
}

/// Opens sessions pre-populated with domain metadata.
pub struct DomainAdapter {
    descriptor: DomainDescriptor,
    profiler: Arc<Profiler>,
    provider: Option<Arc<dyn DomainMetricsProvider>>,
}

impl DomainAdapter {
    /// Create an adapter with no domain provider.
    #[must_use]
    pub const fn new(descriptor: DomainDescriptor, profiler: Arc<Profiler>) -> Self {
        Self {
            descriptor,
            profiler,
            provider: None,
        }
    }

    /// Attach a domain provider to keep in step with the engine.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn DomainMetricsProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Domain description.
    #[must_use]
    pub const fn descriptor(&self) -> &DomainDescriptor {
        &self.descriptor
    }

    /// Underlying engine.
    #[must_use]
    pub const fn profiler(&self) -> &Arc<Profiler> {
        &self.profiler
    }

    /// Tag for `operation` on a logically named entity.
    ///
    /// Depends only on the operation and the entity's name (or the domain
    /// default), never on entity ids.
    #[must_use]
    pub fn tag_for(&self, operation: &str, entity_name: Option<&str>) -> Tag {
        match entity_name
            .filter(|name| !name.trim().is_empty())
            .or(self.descriptor.default_entity)
        {
            Some(name) => Tag::new(self.descriptor.category, format!("{operation}.{name}")),
            None => Tag::new(self.descriptor.category, operation),
        }
    }

    /// Begin timing `operation`.
    ///
    /// `counts` are recorded as custom metrics on the session and forwarded
    /// to the domain provider. A blank operation skips profiling.
    pub fn begin_scope(
        &self,
        operation: &str,
        entity: Option<EntityId>,
        entity_name: Option<&str>,
        counts: &[(&str, f64)],
    ) -> Session {
        if !self.profiler.is_profiling() {
            return Session::inert();
        }
        if operation.trim().is_empty() {
            let category = self.descriptor.category;
            tracing::debug!("Skipping {category} scope with no operation");
            return Session::inert();
        }

        let tag = self.tag_for(operation, entity_name);
        let mut session = self
            .profiler
            .create_session(tag)
            .with_operation(Arc::from(operation));
        if let Some(id) = entity {
            session = session.with_entity(EntityContext {
                id,
                name: entity_name.map(Arc::from),
            });
            if let Some(provider) = &self.provider {
                provider.observe(id, operation, counts);
            }
        }
        for (name, value) in counts {
            session.record_metric(name, *value);
        }
        session.start();
        session
    }

    /// Time `action` as `operation`, disposing the scope even on panic.
    pub fn profile<R>(&self, operation: &str, action: impl FnOnce() -> R) -> R {
        self.profile_entity(operation, None, None, action)
    }

    /// Time `action` as `operation` on an entity.
    pub fn profile_entity<R>(
        &self,
        operation: &str,
        entity: Option<EntityId>,
        entity_name: Option<&str>,
        action: impl FnOnce() -> R,
    ) -> R {
        let _session = self.begin_scope(operation, entity, entity_name, &[]);
        action()
    }

    /// Aggregated timings of `operation` on a named entity.
    #[must_use]
    pub fn operation_metrics(&self, operation: &str, entity_name: Option<&str>) -> MetricsSnapshot {
        self.profiler.metrics(&self.tag_for(operation, entity_name))
    }

    /// Engine and provider metrics for `entity`.
    #[must_use]
    pub fn metrics(&self, entity: EntityId) -> DomainEntityMetrics {
        DomainEntityMetrics {
            engine: self.profiler.entity_metrics(entity),
            domain: self.provider.as_ref().and_then(|p| p.metrics(entity)),
        }
    }

    /// Alert when a session of `operation` on a named entity exceeds `threshold_ms`.
    pub fn register_operation_alert(
        &self,
        operation: &str,
        entity_name: Option<&str>,
        threshold_ms: f64,
    ) -> bool {
        let tag = self.tag_for(operation, entity_name);
        self.profiler.register_session_alert(tag, threshold_ms)
    }

    /// Alert when `metric` recorded against `entity` exceeds `threshold`.
    ///
    /// Registered with both the engine and the provider.
    pub fn register_alert(&self, entity: EntityId, metric: &str, threshold: f64) -> bool {
        let registered = self.profiler.register_entity_alert(entity, metric, threshold);
        if registered {
            if let Some(provider) = &self.provider {
                provider.register_alert(entity, metric, threshold);
            }
        }
        registered
    }

    /// Reset the engine and the provider.
    pub fn reset_stats(&self) {
        self.profiler.reset_stats();
        if let Some(provider) = &self.provider {
            provider.reset_stats();
        }
    }
}
