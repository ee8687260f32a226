//! Threshold rules and their evaluation.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use chronoscope_core::{EntityId, Tag};
use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::events::AlertTriggered;

/// What an alert rule watches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKey {
    /// Duration of every completed session of a tag, in milliseconds.
    Session(Tag),
    /// Running average duration of a tag after each sample, in milliseconds.
    Average(Tag),
    /// A custom metric recorded in sessions of a tag.
    Metric {
        /// Tag of the sessions carrying the metric.
        tag: Tag,
        /// Metric name.
        name: Arc<str>,
    },
    /// A custom metric recorded in sessions naming an entity.
    Entity {
        /// Entity the sessions referred to.
        entity: EntityId,
        /// Metric name.
        name: Arc<str>,
    },
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(tag) => write!(f, "session:{tag}"),
            Self::Average(tag) => write!(f, "average:{tag}"),
            Self::Metric { tag, name } => write!(f, "metric:{tag}:{name}"),
            Self::Entity { entity, name } => write!(f, "entity:{entity}:{name}"),
        }
    }
}

/// Holds one threshold per key; last write wins.
#[derive(Default)]
pub struct AlertRegistry {
    rules: RwLock<HashMap<AlertKey, f64>>,
}

impl AlertRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the threshold for `key`, replacing any existing rule.
    ///
    /// Non-positive or non-finite thresholds are ignored; returns whether the
    /// rule was stored.
    pub fn register(&self, key: AlertKey, threshold: f64) -> bool {
        if !threshold.is_finite() || threshold <= 0.0 {
            tracing::debug!("Ignoring alert for {} with threshold {}", key, threshold);
            return false;
        }
        self.rules.write().insert(key, threshold);
        true
    }

    /// Remove the rule for `key`.
    pub fn unregister(&self, key: &AlertKey) -> bool {
        self.rules.write().remove(key).is_some()
    }

    /// Threshold registered for `key`.
    #[must_use]
    pub fn threshold(&self, key: &AlertKey) -> Option<f64> {
        self.rules.read().get(key).copied()
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    /// Check if no rule is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// Produce an alert iff `value` strictly exceeds the rule for `key`.
    #[must_use]
    pub fn evaluate(&self, key: &AlertKey, value: f64) -> Option<AlertTriggered> {
        let threshold = self.threshold(key)?;
        (value > threshold).then(|| AlertTriggered {
            key: key.clone(),
            value,
            threshold,
            timestamp: SystemTime::now(),
        })
    }

    /// Drop every rule.
    pub fn reset(&self) {
        self.rules.write().clear();
    }
}
