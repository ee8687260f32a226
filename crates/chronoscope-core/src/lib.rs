//! Core types for the Chronoscope instrumentation engine.
//!
//! This crate provides the foundational types shared by every other crate:
//! - `Tag`, the aggregation key for timed operations
//! - Entity identifiers and context attached to sessions
//! - Engine-wide error types

pub mod entity;
pub mod error;
pub mod tag;

pub use entity::{EntityContext, EntityId};
pub use error::{Error, Result};
pub use tag::Tag;

/// Engine-wide constants
pub mod constants {
    /// Default number of recent durations retained per tag
    pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
    /// Category used by `begin_sample` when the caller only supplies a name
    pub const SAMPLE_CATEGORY: &str = "Sample";
}
