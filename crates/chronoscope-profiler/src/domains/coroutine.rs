//! Coroutine and task instrumentation.

use std::ops::Deref;
use std::sync::Arc;

use chronoscope_core::EntityId;

use crate::adapter::{DomainAdapter, DomainDescriptor};
use crate::engine::Profiler;
use crate::session::Session;

/// Coroutine domain.
pub const COROUTINE: DomainDescriptor = DomainDescriptor {
    category: "Coroutine",
    default_entity: Some("anonymous"),
};

/// Steps in a coroutine's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoroutineOperation {
    /// First poll.
    Start,
    /// A later poll.
    Resume,
    /// Run to completion.
    Complete,
    /// Cancelled before completion.
    Cancel,
}

impl CoroutineOperation {
    /// Operation name used in tags.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Resume => "Resume",
            Self::Complete => "Complete",
            Self::Cancel => "Cancel",
        }
    }
}

/// Coroutine sugar over a [`DomainAdapter`].
pub struct CoroutineProfiler {
    adapter: DomainAdapter,
}

impl CoroutineProfiler {
    /// Create a coroutine profiler over `profiler`.
    #[must_use]
    pub const fn new(profiler: Arc<Profiler>) -> Self {
        Self::from_adapter(DomainAdapter::new(COROUTINE, profiler))
    }

    /// Wrap an adapter built for [`COROUTINE`].
    #[must_use]
    pub const fn from_adapter(adapter: DomainAdapter) -> Self {
        Self { adapter }
    }

    /// Begin timing one step of a coroutine.
    ///
    /// `name` is the coroutine's logical name; `running` the number of
    /// coroutines alive in the scheduler.
    pub fn begin_coroutine_scope(
        &self,
        operation: CoroutineOperation,
        coroutine: EntityId,
        name: Option<&str>,
        running: usize,
    ) -> Session {
        self.adapter.begin_scope(
            operation.name(),
            Some(coroutine),
            name,
            &[("running", running as f64)],
        )
    }

    /// Begin timing a resume.
    pub fn begin_resume_scope(
        &self,
        coroutine: EntityId,
        name: Option<&str>,
        running: usize,
    ) -> Session {
        self.begin_coroutine_scope(CoroutineOperation::Resume, coroutine, name, running)
    }

    /// Time one step of a coroutine.
    pub fn profile_step<R>(
        &self,
        operation: CoroutineOperation,
        coroutine: EntityId,
        name: Option<&str>,
        action: impl FnOnce() -> R,
    ) -> R {
        self.adapter
            .profile_entity(operation.name(), Some(coroutine), name, action)
    }
}

impl Deref for CoroutineProfiler {
    type Target = DomainAdapter;

    fn deref(&self) -> &Self::Target {
        &self.adapter
    }
}
