//! Streaming error types.

use thiserror::Error;
use volstream_gpu::GpuError;

/// Errors raised while loading or streaming a volume.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Malformed or unsupported volume data.
    #[error(transparent)]
    Core(#[from] volstream_core::Error),

    /// Graphics-device failure, including capability failures.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// Partition counts must be positive.
    #[error("Invalid partition counts {0}")]
    InvalidPartitions(glam::UVec3),

    /// Block order is not a permutation of the loaded blocks.
    #[error("Block order {0:?} is not a permutation of {1} blocks")]
    InvalidOrder(Vec<usize>, usize),

    /// The volume passed to a streaming call differs from the loaded one.
    #[error("Volume does not match the loaded volume: {0}")]
    VolumeMismatch(String),

    /// An operation needs a loaded volume.
    #[error("No volume loaded")]
    NotLoaded,
}

impl StreamError {
    /// Whether the failure comes from device limits or the proxy check.
    ///
    /// Such failures recur identically until the configuration changes.
    pub fn is_capability_failure(&self) -> bool {
        matches!(self, Self::Gpu(e) if e.is_capability_failure())
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, StreamError>;
