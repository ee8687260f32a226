//! Aggregation keys.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Composite `(category, name)` key identifying one kind of timed operation.
///
/// Two tags are equal iff both category and name match. Cloning is cheap:
/// both parts are reference counted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    category: Arc<str>,
    name: Arc<str>,
}

impl Tag {
    /// Create a tag without validating its parts.
    pub fn new(category: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }

    /// Create a tag, rejecting empty or whitespace-only parts.
    pub fn try_new(category: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Result<Self> {
        let tag = Self::new(category, name);
        if tag.category.trim().is_empty() {
            let message = format!("empty category for name '{}'", tag.name);
            return Err(Error::InvalidTag(message));
        }
        if tag.name.trim().is_empty() {
            let message = format!("empty name in category '{}'", tag.category);
            return Err(Error::InvalidTag(message));
        }
        Ok(tag)
    }

    /// Category part.
    #[inline]
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Name part.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category, self.name)
    }
}
