//! Logging instrumentation, explicit log scopes and arena-backed records.
//!
//! Scopes are plain values passed down the call chain; nothing here reads or
//! writes thread-local state, so a scope follows a unit of work across
//! threads and async continuations.
//!
//! A [`LogRecord`] has a fixed layout and refers to its variable-size
//! [`LogPayload`] through a [`PayloadHandle`]. The [`RecordStore`] owns the
//! payloads; the [`CapturedRecord`] guard returned by
//! [`RecordStore::capture`] is the single owner of each entry and releases it
//! when dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chronoscope_core::{EntityId, Result};
use parking_lot::Mutex;

use crate::adapter::{DomainAdapter, DomainDescriptor};
use crate::arena::{PayloadArena, PayloadHandle};
use crate::engine::Profiler;
use crate::session::Session;

/// Logging domain.
pub const LOGGING: DomainDescriptor = DomainDescriptor {
    category: "Logging",
    default_entity: Some("root"),
};

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    /// Fine-grained tracing.
    Trace = 0,
    /// Developer diagnostics.
    Debug = 1,
    /// Normal operation.
    Info = 2,
    /// Something unexpected but recoverable.
    Warn = 3,
    /// An operation failed.
    Error = 4,
    /// The process cannot continue safely.
    Critical = 5,
}

impl LogLevel {
    /// Upper-case level name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations on a log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogOperation {
    /// One record written.
    Write,
    /// Buffered records flushed.
    Flush,
}

impl LogOperation {
    /// Operation name used in tags.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Write => "Write",
            Self::Flush => "Flush",
        }
    }
}

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct ScopeNode {
    id: u64,
    name: Arc<str>,
    parent: Option<LogScope>,
}

/// A named logging scope with an optional parent.
///
/// Cloning is cheap and shares the chain.
#[derive(Debug, Clone)]
pub struct LogScope {
    node: Arc<ScopeNode>,
}

impl LogScope {
    /// Start a new chain.
    #[must_use]
    pub fn root(name: &str) -> Self {
        Self::with_parent(name, None)
    }

    /// Open a scope nested in `self`.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        Self::with_parent(name, Some(self.clone()))
    }

    fn with_parent(name: &str, parent: Option<Self>) -> Self {
        Self {
            node: Arc::new(ScopeNode {
                id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                name: Arc::from(name),
                parent,
            }),
        }
    }

    /// Unique id of this scope.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.node.id
    }

    /// Name of this scope.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Enclosing scope.
    #[must_use]
    pub fn parent(&self) -> Option<&Self> {
        self.node.parent.as_ref()
    }

    /// Number of scopes in the chain, counting `self`.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// `self` followed by each enclosing scope.
    pub fn ancestors(&self) -> impl Iterator<Item = &Self> {
        std::iter::successors(Some(self), |scope| scope.parent())
    }

    /// Scope names from the root down, joined with `/`.
    #[must_use]
    pub fn path(&self) -> String {
        let mut names: Vec<&str> = self.ancestors().map(Self::name).collect();
        names.reverse();
        names.join("/")
    }
}

impl PartialEq for LogScope {
    fn eq(&self, other: &Self) -> bool {
        self.node.id == other.node.id
    }
}

impl Eq for LogScope {}

/// Variable-size part of a log record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogPayload {
    /// Rendered message text.
    pub message: String,
    /// Description of the error being reported, if any.
    pub exception: Option<String>,
    /// Structured key/value properties.
    pub properties: BTreeMap<String, String>,
    /// Scope the record was written in.
    pub scope: Option<LogScope>,
}

impl LogPayload {
    /// Payload with only a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attach an exception description.
    #[must_use]
    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    /// Attach a structured property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Attach the enclosing scope.
    #[must_use]
    pub fn with_scope(mut self, scope: LogScope) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// Fixed-layout log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct LogRecord {
    /// Nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
    /// Sink the record was written to.
    pub sink: EntityId,
    /// Severity.
    pub level: LogLevel,
    /// Handle of the payload in the owning [`RecordStore`].
    pub payload: PayloadHandle,
}

/// Owner of every live [`LogPayload`].
#[derive(Default)]
pub struct RecordStore {
    payloads: Mutex<PayloadArena<LogPayload>>,
}

impl RecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `payload` and return the record that owns it.
    pub fn capture(
        &self,
        sink: EntityId,
        level: LogLevel,
        payload: LogPayload,
    ) -> CapturedRecord<'_> {
        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
        let handle = self.payloads.lock().insert(payload);
        CapturedRecord {
            store: self,
            record: LogRecord {
                timestamp_ns,
                sink,
                level,
                payload: handle,
            },
            released: false,
        }
    }

    /// Run `f` on the payload of `record`, if it is still live.
    pub fn with_payload<R>(
        &self,
        record: &LogRecord,
        f: impl FnOnce(&LogPayload) -> R,
    ) -> Option<R> {
        let payloads = self.payloads.lock();
        payloads.get(record.payload).map(f)
    }

    /// Copy of the payload of `record`, if it is still live.
    #[must_use]
    pub fn payload(&self, record: &LogRecord) -> Option<LogPayload> {
        self.with_payload(record, LogPayload::clone)
    }

    fn release(&self, record: &LogRecord) -> Result<LogPayload> {
        let released = self.payloads.lock().release(record.payload);
        if let Err(e) = &released {
            tracing::debug!("Releasing log payload failed: {}", e);
        }
        released
    }

    /// Number of live payloads.
    #[must_use]
    pub fn live(&self) -> usize {
        self.payloads.lock().len()
    }
}

/// A captured record and the one owner of its payload.
///
/// Dropping the guard releases the payload. Copies of [`LogRecord`] taken
/// from it go stale at that point.
pub struct CapturedRecord<'a> {
    store: &'a RecordStore,
    record: LogRecord,
    released: bool,
}

impl CapturedRecord<'_> {
    /// The fixed-layout record.
    #[must_use]
    pub const fn record(&self) -> LogRecord {
        self.record
    }

    /// Copy of the payload.
    #[must_use]
    pub fn payload(&self) -> Option<LogPayload> {
        self.store.payload(&self.record)
    }

    /// Release the payload now and take it back.
    pub fn release(mut self) -> Result<LogPayload> {
        self.released = true;
        self.store.release(&self.record)
    }
}

impl Drop for CapturedRecord<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            let _ = self.store.release(&self.record);
        }
    }
}

/// Logging sugar over a [`DomainAdapter`].
pub struct LoggingProfiler {
    adapter: DomainAdapter,
}

impl LoggingProfiler {
    /// Create a logging profiler over `profiler`.
    #[must_use]
    pub const fn new(profiler: Arc<Profiler>) -> Self {
        Self::from_adapter(DomainAdapter::new(LOGGING, profiler))
    }

    /// Wrap an adapter built for [`LOGGING`].
    #[must_use]
    pub const fn from_adapter(adapter: DomainAdapter) -> Self {
        Self { adapter }
    }

    /// Begin timing one write of a `level` record for `target` into `sink`.
    ///
    /// Sessions are keyed by target; the level and the depth of `scope` are
    /// recorded as metrics.
    pub fn begin_log_scope(
        &self,
        sink: EntityId,
        target: &str,
        level: LogLevel,
        scope: Option<&LogScope>,
    ) -> Session {
        let depth = scope.map_or(0, LogScope::depth);
        let level = f64::from(level as u8);
        self.adapter.begin_scope(
            LogOperation::Write.name(),
            Some(sink),
            Some(target),
            &[("level", level), ("scope_depth", depth as f64)],
        )
    }

    /// Begin timing a flush of `sink`.
    pub fn begin_flush_scope(&self, sink: EntityId, pending: usize) -> Session {
        self.adapter.begin_scope(
            LogOperation::Flush.name(),
            Some(sink),
            None,
            &[("pending", pending as f64)],
        )
    }

    /// Time one write.
    pub fn profile_write<R>(
        &self,
        sink: EntityId,
        target: &str,
        level: LogLevel,
        scope: Option<&LogScope>,
        action: impl FnOnce() -> R,
    ) -> R {
        let _session = self.begin_log_scope(sink, target, level, scope);
        action()
    }
}

impl Deref for LoggingProfiler {
    type Target = DomainAdapter;

    fn deref(&self) -> &Self::Target {
        &self.adapter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronoscope_core::Error;

    #[test]
    fn scope_chain() {
        let request = LogScope::root("request");
        let db = request.child("db");
        let query = db.child("query");

        assert_eq!(request.depth(), 1);
        assert_eq!(query.depth(), 3);
        assert_eq!(query.path(), "request/db/query");
        assert_eq!(query.parent(), Some(&db));
        assert!(request.parent().is_none());
        assert_ne!(db.id(), query.id());
    }

    #[test]
    fn scope_moves_across_threads() {
        let scope = LogScope::root("job").child("step");
        let path = std::thread::spawn(move || scope.child("worker").path())
            .join()
            .unwrap();
        assert_eq!(path, "job/step/worker");
    }

    #[test]
    fn write_records_level_and_depth() {
        let logging = LoggingProfiler::new(Arc::new(Profiler::default()));
        let scope = LogScope::root("frame").child("physics");
        let sink = EntityId(1);
        logging.profile_write(sink, "physics", LogLevel::Warn, Some(&scope), || ());

        let writes = logging.operation_metrics("Write", Some("physics"));
        assert_eq!(writes.count, 1);
        let metrics = logging.metrics(sink).engine.metrics;
        assert_eq!(metrics.get("level").copied(), Some(3.0));
        assert_eq!(metrics.get("scope_depth").copied(), Some(2.0));
    }

    #[test]
    fn flush_uses_default_entity() {
        let logging = LoggingProfiler::new(Arc::new(Profiler::default()));
        drop(logging.begin_flush_scope(EntityId(1), 12));
        assert_eq!(logging.operation_metrics("Flush", None).count, 1);
        assert_eq!(logging.operation_metrics("Flush", Some("root")).count, 1);
    }

    #[test]
    fn captured_record_releases_on_drop() {
        let store = RecordStore::new();
        let record = {
            let captured = store.capture(
                EntityId(1),
                LogLevel::Error,
                LogPayload::message("disk full")
                    .with_exception("io error")
                    .with_property("path", "/var/log"),
            );
            assert_eq!(store.live(), 1);
            let payload = captured.payload().unwrap();
            assert_eq!(payload.message, "disk full");
            assert_eq!(payload.properties["path"], "/var/log");
            captured.record()
        };

        assert_eq!(store.live(), 0);
        assert!(store.payload(&record).is_none());
    }

    #[test]
    fn explicit_release_returns_payload() {
        let store = RecordStore::new();
        let scope = LogScope::root("boot");
        let captured = store.capture(
            EntityId(2),
            LogLevel::Info,
            LogPayload::message("ready").with_scope(scope.clone()),
        );
        let record = captured.record();

        let payload = captured.release().unwrap();
        assert_eq!(payload.scope, Some(scope));
        assert_eq!(store.live(), 0);
        let err = store.release(&record).unwrap_err();
        assert!(matches!(err, Error::StaleHandle { .. }));
    }

    #[test]
    fn stale_record_does_not_alias_reused_slot() {
        let store = RecordStore::new();
        let old = store
            .capture(EntityId(1), LogLevel::Debug, LogPayload::message("first"))
            .record();
        let fresh = store.capture(EntityId(1), LogLevel::Debug, LogPayload::message("second"));

        assert_eq!(old.payload.index(), fresh.record().payload.index());
        assert!(store.payload(&old).is_none());
        assert_eq!(fresh.payload().unwrap().message, "second");
    }

    #[test]
    fn levels_order_by_severity() {
        assert!(LogLevel::Trace < LogLevel::Critical);
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
        assert_eq!(LogLevel::Error as u8, 4);
    }
}
