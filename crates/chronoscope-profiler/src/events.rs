//! Events published on the bus.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chronoscope_core::{EntityContext, EntityId, Tag};
use serde::{Deserialize, Serialize};

use crate::aggregator::{duration_ns, ns_to_ms};
use crate::alerts::AlertKey;

/// Published once when a session is disposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCompleted {
    /// Id of the session that completed.
    pub session_id: u64,
    /// Aggregation key.
    pub tag: Tag,
    /// Entity the session measured, if any.
    pub entity: Option<EntityContext>,
    /// Domain operation type, if the session came from an adapter.
    pub operation: Option<Arc<str>>,
    /// Time between start and disposal.
    pub duration: Duration,
    /// Custom metrics recorded during the session, in recording order.
    pub custom_metrics: Vec<(Arc<str>, f64)>,
    /// Wall-clock time of completion.
    pub timestamp: SystemTime,
}

impl SessionCompleted {
    /// Duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        ns_to_ms(duration_ns(self.duration))
    }

    /// Id of the referenced entity.
    #[must_use]
    pub fn entity_id(&self) -> Option<EntityId> {
        self.entity.as_ref().map(|e| e.id)
    }
}

/// Published when an observed value strictly exceeds a registered threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTriggered {
    /// Rule that fired.
    pub key: AlertKey,
    /// Observed value (milliseconds for duration rules).
    pub value: f64,
    /// Threshold it exceeded.
    pub threshold: f64,
    /// Wall-clock time of evaluation.
    pub timestamp: SystemTime,
}
