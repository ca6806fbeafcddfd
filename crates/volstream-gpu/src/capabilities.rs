//! GPU capability detection.

use crate::texture::TextureLimits;
use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// Oldest Vulkan version the texture backend runs on.
const MIN_API_MINOR: u32 = 2;

/// Smallest 3D texture edge worth streaming into.
const MIN_IMAGE_DIMENSION_3D: u32 = 256;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,

    // Texture limits
    /// Largest 3D image edge
    pub max_image_dimension_3d: u32,
    /// Largest 2D image edge
    pub max_image_dimension_2d: u32,

    // Memory info
    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Maximum memory allocation count
    pub max_memory_allocation_count: u32,

    // Available extensions
    pub available_extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);

        let extensions = instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default();

        let available_extensions: HashSet<String> = extensions
            .iter()
            .filter_map(|ext| {
                CStr::from_ptr(ext.extension_name.as_ptr())
                    .to_str()
                    .ok()
                    .map(String::from)
            })
            .collect();

        let vendor = GpuVendor::from_vendor_id(properties.vendor_id);
        let device_name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        Self {
            vendor,
            device_name,
            api_version: properties.api_version,
            driver_version: properties.driver_version,

            max_image_dimension_3d: properties.limits.max_image_dimension3_d,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,

            device_local_memory_mb,
            max_memory_allocation_count: properties.limits.max_memory_allocation_count,

            available_extensions,
        }
    }

    /// Check if the GPU can hold volume textures at all.
    pub fn meets_requirements(&self) -> bool {
        let api_major = vk::api_version_major(self.api_version);
        let api_minor = vk::api_version_minor(self.api_version);

        if api_major < 1 || (api_major == 1 && api_minor < MIN_API_MINOR) {
            return false;
        }

        self.max_image_dimension_3d >= MIN_IMAGE_DIMENSION_3D
    }

    /// Texture limits reported to the streaming layer.
    pub fn texture_limits(&self) -> TextureLimits {
        TextureLimits {
            max_texture_3d: self.max_image_dimension_3d,
            max_texture_2d: self.max_image_dimension_2d,
        }
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM - max 3D {}",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
            self.max_image_dimension_3d,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(api_version: u32, max_3d: u32) -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Other(0),
            device_name: "test".into(),
            api_version,
            driver_version: 0,
            max_image_dimension_3d: max_3d,
            max_image_dimension_2d: 16384,
            device_local_memory_mb: 512,
            max_memory_allocation_count: 4096,
            available_extensions: HashSet::new(),
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
    }

    #[test]
    fn requirements_check_version_and_3d_limit() {
        assert!(caps(vk::API_VERSION_1_2, 2048).meets_requirements());
        assert!(!caps(vk::API_VERSION_1_1, 2048).meets_requirements());
        assert!(!caps(vk::API_VERSION_1_3, 128).meets_requirements());
    }

    #[test]
    fn limits_follow_image_dimensions() {
        let limits = caps(vk::API_VERSION_1_3, 1024).texture_limits();
        assert_eq!(limits.max_texture_3d, 1024);
        assert_eq!(limits.max_texture_2d, 16384);
    }
}
