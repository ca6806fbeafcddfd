//! Error types for the volume data model.

use thiserror::Error;

/// Data-model error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Extent with min > max on some axis
    #[error("Invalid extent: {0}")]
    InvalidExtent(String),

    /// Array tuple count does not match the volume extent
    #[error("Array '{name}' holds {actual} tuples, extent requires {expected}")]
    ArrayLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Named array not present on the volume
    #[error("Unknown array: {0}")]
    UnknownArray(String),

    /// Component count outside what a volume texture can encode
    #[error("Unsupported component count {0} (expected 1..=4)")]
    UnsupportedComponents(usize),

    /// Out of bounds access
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
