//! Timed sessions and their completion.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use chronoscope_bus::EventBus;
use chronoscope_core::{EntityContext, Tag};

use crate::events::SessionCompleted;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Configured but not timing yet.
    Created,
    /// Timing.
    Running,
    /// Duration finalized; completion is being published.
    Completed,
    /// Finished. Further disposal is a no-op.
    Disposed,
}

impl SessionState {
    /// Whether the session has completed or been disposed.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Disposed)
    }
}

/// Publishes completions, honoring the global enable gate.
pub(crate) struct Emitter {
    bus: Arc<EventBus>,
    enabled: AtomicBool,
}

impl Emitter {
    pub(crate) const fn new(bus: Arc<EventBus>, enabled: bool) -> Self {
        Self {
            bus,
            enabled: AtomicBool::new(enabled),
        }
    }

    pub(crate) const fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    #[inline]
    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Publish a completion. Failures are logged here and never reach the caller.
    pub(crate) fn emit(&self, event: SessionCompleted) {
        if !self.is_enabled() {
            return;
        }
        let session_id = event.session_id;
        let tag = event.tag.clone();
        if let Err(e) = self.bus.publish(event) {
            tracing::warn!(
                "Failed to publish completion of session {} ({}): {}",
                session_id,
                tag,
                e
            );
        }
    }
}

struct Active {
    id: u64,
    tag: Tag,
    entity: Option<EntityContext>,
    operation: Option<Arc<str>>,
    started: Option<Instant>,
    metrics: Vec<(Arc<str>, f64)>,
    state: SessionState,
    emitter: Arc<Emitter>,
}

/// Handle for one in-progress timed operation.
///
/// Disposing the session (explicitly or by dropping it) finalizes its
/// duration and publishes exactly one [`SessionCompleted`]. A session that
/// is leaked with `mem::forget` never completes and contributes nothing.
///
/// When profiling is disabled every `begin*` call returns the inert session:
/// it holds no state, reads no clock and publishes nothing.
#[must_use = "a session completes when dropped; binding it to `_` drops it immediately"]
pub struct Session {
    active: Option<Active>,
}

impl Session {
    /// The no-op session.
    #[inline]
    pub const fn inert() -> Self {
        Self { active: None }
    }

    pub(crate) fn created(tag: Tag, emitter: Arc<Emitter>) -> Self {
        Self {
            active: Some(Active {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                tag,
                entity: None,
                operation: None,
                started: None,
                metrics: Vec::new(),
                state: SessionState::Created,
                emitter,
            }),
        }
    }

    /// Attach entity context.
    pub fn with_entity(mut self, entity: EntityContext) -> Self {
        if let Some(active) = &mut self.active {
            active.entity = Some(entity);
        }
        self
    }

    /// Attach a domain operation type.
    pub fn with_operation(mut self, operation: Arc<str>) -> Self {
        if let Some(active) = &mut self.active {
            active.operation = Some(operation);
        }
        self
    }

    /// Start timing. Only a `Created` session is affected.
    pub fn start(&mut self) -> &mut Self {
        if let Some(active) = &mut self.active {
            if active.state == SessionState::Created {
                active.started = Some(Instant::now());
                active.state = SessionState::Running;
            }
        }
        self
    }

    /// Record a named value to publish with the completion.
    ///
    /// Recording the same name again replaces the earlier value. Ignored once
    /// the session has completed.
    pub fn record_metric(&mut self, name: &str, value: f64) {
        let Some(active) = &mut self.active else {
            return;
        };
        if active.state.is_finished() {
            return;
        }
        if let Some(slot) = active.metrics.iter_mut().find(|(n, _)| &**n == name) {
            slot.1 = value;
        } else {
            active.metrics.push((Arc::from(name), value));
        }
    }

    /// Check if this is the no-op session.
    #[must_use]
    pub const fn is_inert(&self) -> bool {
        self.active.is_none()
    }

    /// Current state; `None` for the inert session.
    #[must_use]
    pub fn state(&self) -> Option<SessionState> {
        self.active.as_ref().map(|a| a.state)
    }

    /// Unique id; `None` for the inert session.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Aggregation key; `None` for the inert session.
    #[must_use]
    pub fn tag(&self) -> Option<&Tag> {
        self.active.as_ref().map(|a| &a.tag)
    }

    /// Time since start, while running.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let active = self.active.as_ref()?;
        match active.state {
            SessionState::Running => active.started.map(|s| s.elapsed()),
            _ => None,
        }
    }

    /// Finalize the duration and publish the completion.
    ///
    /// Idempotent. A session disposed before it was started publishes nothing.
    pub fn dispose(&mut self) {
        let Some(active) = &mut self.active else {
            return;
        };
        match active.state {
            SessionState::Running => {}
            SessionState::Created => {
                active.state = SessionState::Disposed;
                return;
            }
            SessionState::Completed | SessionState::Disposed => return,
        }

        let duration = active.started.map_or(Duration::ZERO, |s| s.elapsed());
        active.state = SessionState::Completed;

        let event = SessionCompleted {
            session_id: active.id,
            tag: active.tag.clone(),
            entity: active.entity.take(),
            operation: active.operation.take(),
            duration,
            custom_metrics: std::mem::take(&mut active.metrics),
            timestamp: SystemTime::now(),
        };
        active.emitter.emit(event);
        active.state = SessionState::Disposed;
    }
}

impl Drop for Session {
    #[inline]
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.active {
            None => f.write_str("Session(inert)"),
            Some(active) => f
                .debug_struct("Session")
                .field("id", &active.id)
                .field("tag", &active.tag)
                .field("state", &active.state)
                .finish_non_exhaustive(),
        }
    }
}
