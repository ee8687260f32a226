//! Serialization instrumentation.

use std::ops::Deref;
use std::sync::Arc;

use chronoscope_core::EntityId;

use crate::adapter::{DomainAdapter, DomainDescriptor};
use crate::engine::Profiler;
use crate::session::Session;

/// Serialization domain.
pub const SERIALIZATION: DomainDescriptor = DomainDescriptor {
    category: "Serialization",
    default_entity: Some("default"),
};

/// Direction of a serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializationOperation {
    /// Value to bytes.
    Serialize,
    /// Bytes to value.
    Deserialize,
}

impl SerializationOperation {
    /// Operation name used in tags.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Serialize => "Serialize",
            Self::Deserialize => "Deserialize",
        }
    }
}

/// Serialization sugar over a [`DomainAdapter`].
pub struct SerializationProfiler {
    adapter: DomainAdapter,
}

impl SerializationProfiler {
    /// Create a serialization profiler over `profiler`.
    #[must_use]
    pub const fn new(profiler: Arc<Profiler>) -> Self {
        Self::from_adapter(DomainAdapter::new(SERIALIZATION, profiler))
    }

    /// Wrap an adapter built for [`SERIALIZATION`].
    #[must_use]
    pub const fn from_adapter(adapter: DomainAdapter) -> Self {
        Self { adapter }
    }

    /// Begin timing a serialization.
    ///
    /// `format` names the serializer (`"json"`, `"bincode"`); `None` uses the
    /// domain default. Record the output size with
    /// [`Session::record_metric`] once it is known.
    pub fn begin_serialize_scope(&self, serializer: EntityId, format: Option<&str>) -> Session {
        self.adapter.begin_scope(
            SerializationOperation::Serialize.name(),
            Some(serializer),
            format,
            &[],
        )
    }

    /// Begin timing a deserialization of `input_bytes` bytes.
    pub fn begin_deserialize_scope(
        &self,
        serializer: EntityId,
        format: Option<&str>,
        input_bytes: usize,
    ) -> Session {
        self.adapter.begin_scope(
            SerializationOperation::Deserialize.name(),
            Some(serializer),
            format,
            &[("bytes", input_bytes as f64)],
        )
    }

    /// Time a serialization producing bytes, recording their length.
    pub fn profile_serialize<E>(
        &self,
        serializer: EntityId,
        format: Option<&str>,
        action: impl FnOnce() -> Result<Vec<u8>, E>,
    ) -> Result<Vec<u8>, E> {
        let mut session = self.begin_serialize_scope(serializer, format);
        let result = action();
        if let Ok(bytes) = &result {
            session.record_metric("bytes", bytes.len() as f64);
        }
        result
    }
}

impl Deref for SerializationProfiler {
    type Target = DomainAdapter;

    fn deref(&self) -> &Self::Target {
        &self.adapter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_records_output_size() {
        let serializers = SerializationProfiler::new(Arc::new(Profiler::default()));
        let encode = || Ok::<_, String>(vec![0u8; 64]);
        let out = serializers.profile_serialize(EntityId(1), Some("json"), encode);
        assert_eq!(out.map(|b| b.len()), Ok(64));

        let serializes = serializers.operation_metrics("Serialize", Some("json"));
        assert_eq!(serializes.count, 1);
        let metrics = serializers.metrics(EntityId(1)).engine.metrics;
        assert_eq!(metrics.get("bytes").copied(), Some(64.0));
    }

    #[test]
    fn failed_serialize_is_still_timed() {
        let serializers = SerializationProfiler::new(Arc::new(Profiler::default()));
        let encode = || Err::<Vec<u8>, _>("unsupported".to_string());
        let out = serializers.profile_serialize(EntityId(1), None, encode);
        assert!(out.is_err());

        let serializes = serializers.operation_metrics("Serialize", Some("default"));
        assert_eq!(serializes.count, 1);
        let metrics = serializers.metrics(EntityId(1)).engine.metrics;
        assert!(metrics.get("bytes").is_none());
    }

    #[test]
    fn deserialize_carries_input_size() {
        let serializers = SerializationProfiler::new(Arc::new(Profiler::default()));
        let session = serializers.begin_deserialize_scope(EntityId(2), Some("bincode"), 128);
        drop(session);
        let deserializes = serializers.operation_metrics("Deserialize", Some("bincode"));
        assert_eq!(deserializes.count, 1);
    }
}
