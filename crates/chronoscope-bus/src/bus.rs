//! Typed publish/subscribe dispatcher.

use std::any::{type_name, Any, TypeId};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use thiserror::Error;

/// Marker for types that can travel over the bus.
pub trait Event: Any + Send + Sync {}

impl<T: Any + Send + Sync> Event for T {}

/// Error returned by a handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by a handler.
pub type HandlerResult = Result<(), HandlerError>;

/// Delivery failure reported to the publisher.
#[derive(Error, Debug)]
pub enum BusError {
    /// A handler returned an error.
    #[error("handler for {event} failed: {message}")]
    Handler {
        /// Type name of the event being delivered.
        event: &'static str,
        /// Rendered handler error.
        message: String,
    },

    /// A handler panicked; the panic was contained.
    #[error("handler for {event} panicked")]
    Panicked {
        /// Type name of the event being delivered.
        event: &'static str,
    },
}

/// Identifies one subscription so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ErasedHandler = Arc<dyn Fn(&dyn Any) -> HandlerResult + Send + Sync>;

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    handler: ErasedHandler,
}

/// Synchronous, ordered, typed event bus.
///
/// Handler lists are copy-on-write: publishing takes a read lock only long
/// enough to clone an `Arc`, so handlers may publish or subscribe re-entrantly.
pub struct EventBus {
    handlers: RwLock<HashMap<TypeId, Arc<[Subscription]>>>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.handlers.read().len())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe a handler to every event of type `E`.
    ///
    /// Handlers run in the order they were subscribed.
    pub fn subscribe<E, F>(&self, handler: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) -> HandlerResult + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let erased: ErasedHandler = Arc::new(move |event: &dyn Any| {
            let Some(event) = event.downcast_ref::<E>() else {
                return Ok(());
            };
            handler(event)
        });

        let mut handlers = self.handlers.write();
        let list = handlers
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Arc::from(Vec::new()));
        let mut updated: Vec<Subscription> = list.iter().cloned().collect();
        updated.push(Subscription {
            id,
            handler: erased,
        });
        *list = Arc::from(updated);

        tracing::trace!("Subscribed {:?} to {}", id, type_name::<E>());
        id
    }

    /// Remove a subscription. Returns `false` if it was not found.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        for list in handlers.values_mut() {
            if list.iter().any(|s| s.id == id) {
                let updated: Vec<_> = list.iter().filter(|s| s.id != id).cloned().collect();
                *list = Arc::from(updated);
                return true;
            }
        }
        false
    }

    /// Number of handlers subscribed to `E`.
    #[must_use]
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.handlers
            .read()
            .get(&TypeId::of::<E>())
            .map_or(0, |list| list.len())
    }

    /// Deliver `event` to every handler of its type before returning.
    ///
    /// Every handler is invoked even if an earlier one fails; the first
    /// failure is returned.
    pub fn publish<E: Event>(&self, event: E) -> Result<(), BusError> {
        let list = self.handlers.read().get(&TypeId::of::<E>()).cloned();
        let Some(list) = list else {
            return Ok(());
        };

        let mut first_error = None;
        for subscription in list.iter() {
            let deliver = || (subscription.handler)(&event as &dyn Any);
            let outcome = panic::catch_unwind(AssertUnwindSafe(deliver));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => BusError::Handler {
                    event: type_name::<E>(),
                    message: e.to_string(),
                },
                Err(_) => BusError::Panicked {
                    event: type_name::<E>(),
                },
            };
            tracing::trace!("Delivery to {:?} failed: {}", subscription.id, failure);
            first_error.get_or_insert(failure);
        }

        first_error.map_or(Ok(()), Err)
    }
}
