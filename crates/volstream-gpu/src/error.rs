//! GPU error types.

use ash::vk;
use glam::UVec3;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Requested texture is larger than the device supports.
    #[error("Texture size {requested} exceeds device limit {max}")]
    ExceedsDeviceLimit { requested: UVec3, max: u32 },

    /// The proxy allocation check refused the texture.
    #[error("Texture {size} with format {format} rejected by device: {reason}")]
    ProxyRejected {
        size: UVec3,
        format: String,
        reason: String,
    },

    /// Texture handle does not name a live texture.
    #[error("Unknown texture handle: {0}")]
    UnknownTexture(u32),

    /// Upload region or host layout does not fit the texture or the data.
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Whether this is a capability failure the caller may retry with a
    /// smaller configuration.
    pub const fn is_capability_failure(&self) -> bool {
        matches!(
            self,
            Self::ExceedsDeviceLimit { .. } | Self::ProxyRejected { .. }
        )
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
