//! Render error types.

use thiserror::Error;
use volstream_gpu::GpuError;
use volstream_volume::StreamError;

/// Errors raised while preparing or issuing volume draws.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Block loading or streaming failed.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Graphics-device failure outside of block streaming.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// Malformed volume data.
    #[error(transparent)]
    Core(#[from] volstream_core::Error),

    /// The mapper has no volume to draw.
    #[error("No volume set on mapper")]
    NoInput,

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RenderError {
    /// Whether the failure comes from device limits or the proxy check.
    pub fn is_capability_failure(&self) -> bool {
        match self {
            Self::Stream(e) => e.is_capability_failure(),
            Self::Gpu(e) => e.is_capability_failure(),
            _ => false,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;
