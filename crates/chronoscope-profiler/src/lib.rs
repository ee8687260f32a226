//! Timing, aggregation and alerting for instrumented operations.
//!
//! Callers open a [`Session`] around an operation. Disposing it publishes a
//! [`SessionCompleted`] event on an [`EventBus`]; the [`Profiler`] that
//! created the session subscribes to those events and is the only writer of
//! its running statistics, bounded history and per-entity metrics. Alerts
//! are evaluated on every completion and published as [`AlertTriggered`].
//!
//! Domain code (pools, message buses, serializers, coroutines, logging) goes
//! through a [`DomainAdapter`] that attaches entity and operation context.
//!
//! # Feature Flags
//!
//! - `profiling`: Enable the [`profile_scope!`] and [`profile_duration!`]
//!   macros. When disabled, they expand to nothing.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use chronoscope_profiler::{PoolProfiler, Profiler, ProfilerConfig, EntityId};
//!
//! let profiler = Arc::new(Profiler::new(ProfilerConfig::from_env()?));
//! let pools = PoolProfiler::new(Arc::clone(&profiler));
//!
//! {
//!     let _scope = pools.begin_acquire_scope(EntityId(1), "bullets", 3, 61);
//!     // ... acquire
//! } // completion published here
//!
//! println!("{:?}", pools.operation_metrics("Acquire", Some("bullets")));
//! ```
//!
//! Or through the global context:
//!
//! ```ignore
//! chronoscope_profiler::init(ProfilerConfig::default());
//! let _sample = chronoscope_profiler::begin_sample("tick");
//! ```

mod adapter;
mod aggregator;
mod alerts;
pub mod arena;
mod cache;
mod config;
mod context;
pub mod domains;
mod engine;
mod events;
mod history;
mod macros;
mod provider;
mod ring_buffer;
mod session;

// Re-export public API
pub use adapter::{DomainAdapter, DomainDescriptor, DomainEntityMetrics};
pub use aggregator::{Counters, MetricsAggregator, MetricsSnapshot};
pub use alerts::{AlertKey, AlertRegistry};
pub use arena::{PayloadArena, PayloadHandle};
pub use cache::{CacheStats, MetricsCache};
pub use config::{ProfilerConfig, ENV_ENABLED, ENV_HISTORY_CAPACITY, ENV_PERCENTILES};
pub use context::{
    all_metrics, begin_sample, begin_scope, begin_scope_in, global, history, init, init_from_env,
    is_initialized, is_profiling, metrics, record_duration, register_metric_alert,
    register_session_alert, reset_stats, shutdown, start_profiling, stop_profiling,
};
pub use domains::{
    CoroutineProfiler, LoggingProfiler, MessageBusProfiler, PoolProfiler, SerializationProfiler,
};
pub use engine::{EntityMetrics, Profiler};
pub use events::{AlertTriggered, SessionCompleted};
pub use history::HistoryBuffer;
pub use provider::{CounterProvider, DomainMetrics, DomainMetricsProvider};
pub use ring_buffer::RingBuffer;
pub use session::{Session, SessionState};

// Re-export the shared vocabulary so callers need a single dependency
pub use chronoscope_bus::{BusError, EventBus, HandlerError, HandlerResult, SubscriptionId};
pub use chronoscope_core::{EntityContext, EntityId, Error, Result, Tag};
