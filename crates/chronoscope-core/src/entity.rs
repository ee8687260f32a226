//! Entity identifiers attached to sessions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Process-local identifier of a measured entity (a pool, a bus, a serializer).
///
/// Entity ids are transient and never become part of a `Tag`; they only key
/// the finer-grained per-entity metrics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[repr(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Optional domain context carried by a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityContext {
    /// Identifier of the entity.
    pub id: EntityId,
    /// Logical, stable name of the entity, if it has one.
    pub name: Option<Arc<str>>,
}

impl EntityContext {
    /// Context with an id only.
    #[must_use]
    pub const fn new(id: EntityId) -> Self {
        Self { id, name: None }
    }

    /// Context with an id and a logical name.
    pub fn named(id: EntityId, name: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            name: Some(name.into()),
        }
    }
}
