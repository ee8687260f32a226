//! Per-domain sugar over [`DomainAdapter`](crate::DomainAdapter).

pub mod coroutine;
pub mod logging;
pub mod message;
pub mod pool;
pub mod serialization;

pub use coroutine::{CoroutineOperation, CoroutineProfiler, COROUTINE};
pub use logging::{
    CapturedRecord, LogLevel, LogOperation, LogPayload, LogRecord, LogScope, LoggingProfiler,
    RecordStore, LOGGING,
};
pub use message::{message_type_name, MessageBusProfiler, MessageOperation, MESSAGE_BUS};
pub use pool::{PoolOperation, PoolProfiler, POOL};
pub use serialization::{SerializationOperation, SerializationProfiler, SERIALIZATION};
