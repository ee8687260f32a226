//! Object pool instrumentation.

use std::ops::Deref;
use std::sync::Arc;

use chronoscope_core::EntityId;

use crate::adapter::{DomainAdapter, DomainDescriptor};
use crate::engine::Profiler;
use crate::session::Session;

/// Object pool domain.
pub const POOL: DomainDescriptor = DomainDescriptor {
    category: "Pool",
    default_entity: None,
};

/// Operations on a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolOperation {
    /// An object was taken from the pool.
    Acquire,
    /// An object was returned to the pool.
    Release,
    /// The pool allocated a new object.
    Create,
    /// The pool destroyed an object.
    Destroy,
    /// The pool was emptied.
    Clear,
}

impl PoolOperation {
    /// Operation name used in tags.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Acquire => "Acquire",
            Self::Release => "Release",
            Self::Create => "Create",
            Self::Destroy => "Destroy",
            Self::Clear => "Clear",
        }
    }
}

/// Pool sugar over a [`DomainAdapter`].
pub struct PoolProfiler {
    adapter: DomainAdapter,
}

impl PoolProfiler {
    /// Create a pool profiler over `profiler`.
    #[must_use]
    pub const fn new(profiler: Arc<Profiler>) -> Self {
        Self::from_adapter(DomainAdapter::new(POOL, profiler))
    }

    /// Wrap an adapter built for [`POOL`].
    #[must_use]
    pub const fn from_adapter(adapter: DomainAdapter) -> Self {
        Self { adapter }
    }

    /// Begin timing `operation` on a pool, recording its occupancy.
    pub fn begin_pool_scope(
        &self,
        operation: PoolOperation,
        pool: EntityId,
        pool_name: &str,
        active: usize,
        available: usize,
    ) -> Session {
        self.adapter.begin_scope(
            operation.name(),
            Some(pool),
            Some(pool_name),
            &[("active", active as f64), ("available", available as f64)],
        )
    }

    /// Begin timing an acquire.
    pub fn begin_acquire_scope(
        &self,
        pool: EntityId,
        pool_name: &str,
        active: usize,
        available: usize,
    ) -> Session {
        self.begin_pool_scope(PoolOperation::Acquire, pool, pool_name, active, available)
    }

    /// Begin timing a release.
    pub fn begin_release_scope(
        &self,
        pool: EntityId,
        pool_name: &str,
        active: usize,
        available: usize,
    ) -> Session {
        self.begin_pool_scope(PoolOperation::Release, pool, pool_name, active, available)
    }

    /// Time `action` as `operation` on a pool.
    pub fn profile_pool_action<R>(
        &self,
        operation: PoolOperation,
        pool: EntityId,
        pool_name: &str,
        action: impl FnOnce() -> R,
    ) -> R {
        self.adapter
            .profile_entity(operation.name(), Some(pool), Some(pool_name), action)
    }
}

impl Deref for PoolProfiler {
    type Target = DomainAdapter;

    fn deref(&self) -> &Self::Target {
        &self.adapter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::CounterProvider;
    use chronoscope_core::Tag;

    #[test]
    fn acquire_and_release_aggregate_per_pool_name() {
        let pools = PoolProfiler::new(Arc::new(Profiler::default()));
        drop(pools.begin_acquire_scope(EntityId(1), "bullets", 1, 9));
        drop(pools.begin_acquire_scope(EntityId(2), "bullets", 2, 8));
        drop(pools.begin_release_scope(EntityId(1), "bullets", 1, 9));

        let acquires = pools.operation_metrics("Acquire", Some("bullets"));
        assert_eq!(acquires.count, 2);
        let releases = pools.operation_metrics("Release", Some("bullets"));
        assert_eq!(releases.count, 1);
        let tag = Tag::new("Pool", "Acquire.bullets");
        assert_eq!(pools.profiler().metrics(&tag).count, 2);
    }

    #[test]
    fn occupancy_is_tracked_per_pool() {
        let provider = Arc::new(CounterProvider::new());
        let adapter = DomainAdapter::new(POOL, Arc::new(Profiler::default()));
        let pools = PoolProfiler::from_adapter(adapter.with_provider(provider));
        drop(pools.begin_acquire_scope(EntityId(4), "enemies", 3, 7));

        let metrics = pools.metrics(EntityId(4));
        assert_eq!(metrics.engine.name.as_deref(), Some("enemies"));
        assert_eq!(metrics.engine.metrics.get("active").copied(), Some(3.0));
        assert_eq!(metrics.domain.unwrap()["Acquire.count"], 1.0);
    }

    #[test]
    fn pool_alert_fires_on_slow_acquire() {
        let pools = PoolProfiler::new(Arc::new(Profiler::default()));
        let fired = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        pools.profiler().subscribe_alerts(move |alert| {
            sink.lock().push(alert.value);
            Ok(())
        });
        pools.register_alert(EntityId(1), "active", 5.0);

        drop(pools.begin_acquire_scope(EntityId(1), "bullets", 4, 6));
        drop(pools.begin_acquire_scope(EntityId(1), "bullets", 6, 4));

        assert_eq!(*fired.lock(), vec![6.0]);
    }

    #[test]
    fn profile_pool_action_returns_value() {
        let pools = PoolProfiler::new(Arc::new(Profiler::default()));
        let pool = EntityId(1);
        let created = pools.profile_pool_action(PoolOperation::Create, pool, "bullets", || 42);
        assert_eq!(created, 42);
        assert_eq!(pools.operation_metrics("Create", Some("bullets")).count, 1);
    }
}
