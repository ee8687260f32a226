//! Global profiler context singleton.
//!
//! Before [`init`] and after [`shutdown`] every `begin*` call returns the
//! inert session and every read returns empty results.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chronoscope_core::{Result, Tag};
use parking_lot::RwLock;

use crate::aggregator::MetricsSnapshot;
use crate::config::ProfilerConfig;
use crate::engine::Profiler;
use crate::session::Session;

/// Global profiler.
static PROFILER: RwLock<Option<Arc<Profiler>>> = RwLock::new(None);

/// Initialize the global profiler.
///
/// Call this once at application startup. Later calls keep the existing
/// profiler and ignore `config`.
pub fn init(config: ProfilerConfig) -> Arc<Profiler> {
    let mut guard = PROFILER.write();
    if let Some(profiler) = guard.as_ref() {
        return Arc::clone(profiler);
    }
    tracing::debug!(
        "Initializing global profiler (enabled: {}, history: {})",
        config.enabled,
        config.history_capacity
    );
    let profiler = Arc::new(Profiler::new(config));
    *guard = Some(Arc::clone(&profiler));
    profiler
}

/// Initialize the global profiler from `CHRONOSCOPE_*` environment variables.
pub fn init_from_env() -> Result<Arc<Profiler>> {
    Ok(init(ProfilerConfig::from_env()?))
}

/// Shutdown the profiler.
///
/// Sessions already begun keep their profiler alive and still complete.
pub fn shutdown() {
    if PROFILER.write().take().is_some() {
        tracing::debug!("Global profiler shut down");
    }
}

/// The global profiler, if initialized.
#[must_use]
pub fn global() -> Option<Arc<Profiler>> {
    PROFILER.read().clone()
}

/// Check if the profiler is initialized.
#[must_use]
pub fn is_initialized() -> bool {
    PROFILER.read().is_some()
}

/// Run `f` against the global profiler without holding the context lock, so
/// that bus handlers may call back into this module.
#[inline]
fn with_global<R>(f: impl FnOnce(&Profiler) -> R) -> Option<R> {
    let profiler = global()?;
    Some(f(&profiler))
}

/// Begin timing a named sample in the default category.
#[inline]
pub fn begin_sample(name: &str) -> Session {
    with_global(|p| p.begin_sample(name)).unwrap_or_else(Session::inert)
}

/// Begin timing an operation under `tag`.
#[inline]
pub fn begin_scope(tag: Tag) -> Session {
    with_global(|p| p.begin_scope(tag)).unwrap_or_else(Session::inert)
}

/// Begin timing under `(category, name)`.
#[inline]
pub fn begin_scope_in(category: &str, name: &str) -> Session {
    with_global(|p| p.begin_scope_in(category, name)).unwrap_or_else(Session::inert)
}

/// Report a duration measured by the caller.
#[inline]
pub fn record_duration(tag: Tag, duration: Duration) {
    with_global(|p| p.record_duration(tag, duration));
}

/// Enable the global profiler.
pub fn start_profiling() {
    with_global(Profiler::start_profiling);
}

/// Disable the global profiler.
pub fn stop_profiling() {
    with_global(Profiler::stop_profiling);
}

/// Check if the global profiler is initialized and enabled.
#[must_use]
pub fn is_profiling() -> bool {
    with_global(Profiler::is_profiling).unwrap_or(false)
}

/// Reset all profiling statistics.
pub fn reset_stats() {
    with_global(Profiler::reset_stats);
}

/// Snapshot for `tag`.
#[must_use]
pub fn metrics(tag: &Tag) -> MetricsSnapshot {
    with_global(|p| p.metrics(tag)).unwrap_or_default()
}

/// Snapshots of every tracked tag.
#[must_use]
pub fn all_metrics() -> BTreeMap<Tag, MetricsSnapshot> {
    with_global(Profiler::all_metrics).unwrap_or_default()
}

/// Retained durations for `tag`, oldest first.
#[must_use]
pub fn history(tag: &Tag) -> Vec<Duration> {
    with_global(|p| p.history(tag)).unwrap_or_default()
}

/// Alert when a single session of `tag` takes longer than `threshold_ms`.
pub fn register_session_alert(tag: Tag, threshold_ms: f64) -> bool {
    with_global(|p| p.register_session_alert(tag, threshold_ms)).unwrap_or(false)
}

/// Alert when the running average of `tag` exceeds `threshold_ms`.
pub fn register_metric_alert(tag: Tag, threshold_ms: f64) -> bool {
    with_global(|p| p.register_metric_alert(tag, threshold_ms)).unwrap_or(false)
}
