//! In-process typed event bus.
//!
//! Events are delivered synchronously on the publishing thread, to every
//! handler subscribed for the event's concrete type, in subscription order.
//! A handler that fails or panics does not prevent delivery to the handlers
//! after it; the first failure is reported back to the publisher.
//!
//! ```ignore
//! use chronoscope_bus::EventBus;
//!
//! let bus = EventBus::new();
//! bus.subscribe(|event: &String| {
//!     println!("got {event}");
//!     Ok(())
//! });
//! bus.publish(String::from("hello"))?;
//! ```

mod bus;

pub use bus::{BusError, Event, EventBus, HandlerError, HandlerResult, SubscriptionId};
