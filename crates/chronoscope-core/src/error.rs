//! Error types for the engine.

use thiserror::Error;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A tag was built from an empty category or name
    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    /// Configuration could not be parsed or is out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// An arena handle outlived the payload it referenced
    #[error("Stale handle: index {index}, generation {generation}")]
    StaleHandle {
        /// Slot index of the handle.
        index: u32,
        /// Generation the handle was issued with.
        generation: u32,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
