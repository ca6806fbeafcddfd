//! Graphics-device layer for volstream.
//!
//! This crate provides:
//! - The [`TextureDevice`] seam used by the streaming and rendering crates
//! - A Vulkan implementation built on ash and gpu-allocator
//! - GPU capability detection and context management
//! - An in-memory device for headless runs and tests (feature `headless`)

pub mod capabilities;
pub mod command;
pub mod context;
pub mod error;
#[cfg(any(test, feature = "headless"))]
pub mod headless;
pub mod instance;
pub mod memory;
pub mod sync;
pub mod texture;
pub mod vulkan;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use context::{GpuContext, GpuContextBuilder};
pub use error::{GpuError, Result};
#[cfg(any(test, feature = "headless"))]
pub use headless::{DeviceStats, HeadlessDevice};
pub use memory::{GpuAllocator, GpuImage, StagingBuffer};
pub use texture::{
    ChannelKind, Filter, HostLayout, SamplerState, TexelFormat, TextureDesc, TextureDevice,
    TextureDimension, TextureHandle, TextureLimits, TextureRegion,
};
pub use vulkan::VulkanTextureDevice;
