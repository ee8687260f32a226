//! Message bus instrumentation.
//!
//! Scopes are keyed by message type, so every bus instance publishing the
//! same message aggregates under one tag.

use std::any::type_name;
use std::ops::Deref;
use std::sync::Arc;

use chronoscope_core::EntityId;

use crate::adapter::{DomainAdapter, DomainDescriptor};
use crate::engine::Profiler;
use crate::session::Session;

/// Message bus domain.
pub const MESSAGE_BUS: DomainDescriptor = DomainDescriptor {
    category: "MessageBus",
    default_entity: Some("Untyped"),
};

/// Operations on a message bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageOperation {
    /// A message was published.
    Publish,
    /// A message was delivered to one subscriber.
    Deliver,
    /// A handler subscribed.
    Subscribe,
    /// A handler unsubscribed.
    Unsubscribe,
}

impl MessageOperation {
    /// Operation name used in tags.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Publish => "Publish",
            Self::Deliver => "Deliver",
            Self::Subscribe => "Subscribe",
            Self::Unsubscribe => "Unsubscribe",
        }
    }
}

/// Short, stable name of a message type (the last path segment).
#[must_use]
pub fn message_type_name<M: ?Sized>() -> &'static str {
    let full = type_name::<M>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Message bus sugar over a [`DomainAdapter`].
pub struct MessageBusProfiler {
    adapter: DomainAdapter,
}

impl MessageBusProfiler {
    /// Create a message bus profiler over `profiler`.
    #[must_use]
    pub const fn new(profiler: Arc<Profiler>) -> Self {
        Self::from_adapter(DomainAdapter::new(MESSAGE_BUS, profiler))
    }

    /// Wrap an adapter built for [`MESSAGE_BUS`].
    #[must_use]
    pub const fn from_adapter(adapter: DomainAdapter) -> Self {
        Self { adapter }
    }

    /// Begin timing `operation` for a message type named at runtime.
    pub fn begin_message_scope(
        &self,
        operation: MessageOperation,
        bus: EntityId,
        message_type: &str,
        subscribers: usize,
    ) -> Session {
        self.adapter.begin_scope(
            operation.name(),
            Some(bus),
            Some(message_type),
            &[("subscribers", subscribers as f64)],
        )
    }

    /// Begin timing the publication of an `M`.
    pub fn begin_publish_scope<M: ?Sized>(&self, bus: EntityId, subscribers: usize) -> Session {
        self.begin_message_scope(
            MessageOperation::Publish,
            bus,
            message_type_name::<M>(),
            subscribers,
        )
    }

    /// Begin timing the delivery of an `M` to one subscriber.
    pub fn begin_deliver_scope<M: ?Sized>(&self, bus: EntityId) -> Session {
        self.adapter.begin_scope(
            MessageOperation::Deliver.name(),
            Some(bus),
            Some(message_type_name::<M>()),
            &[],
        )
    }

    /// Time publishing an `M`.
    pub fn profile_publish<M: ?Sized, R>(
        &self,
        bus: EntityId,
        subscribers: usize,
        action: impl FnOnce() -> R,
    ) -> R {
        let _session = self.begin_publish_scope::<M>(bus, subscribers);
        action()
    }
}

impl Deref for MessageBusProfiler {
    type Target = DomainAdapter;

    fn deref(&self) -> &Self::Target {
        &self.adapter
    }
}
