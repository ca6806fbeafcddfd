//! Vulkan device ownership for texture streaming.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device};
use crate::memory::GpuAllocator;
use crate::texture::TextureLimits;
use ash::vk;
use parking_lot::Mutex;
use std::sync::Arc;

/// A logical device with one queue that both uploads and samples volume
/// textures, plus the allocator their memory comes from.
pub struct GpuContext {
    _entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    capabilities: GpuCapabilities,
    allocator: Mutex<GpuAllocator>,
    queue_family: u32,
    queue: vk::Queue,
}

impl GpuContext {
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Largest textures the device accepts.
    pub fn texture_limits(&self) -> TextureLimits {
        self.capabilities.texture_limits()
    }

    /// One-line description of the selected device.
    pub fn describe(&self) -> String {
        self.capabilities.summary()
    }

    /// What the driver allows for a sampled, transfer-destination image of
    /// `format` and `ty`. Fails when the combination is unsupported.
    pub fn image_format_properties(
        &self,
        format: vk::Format,
        ty: vk::ImageType,
    ) -> Result<vk::ImageFormatProperties> {
        let properties = unsafe {
            self.instance.get_physical_device_image_format_properties(
                self.physical_device,
                format,
                ty,
                vk::ImageTiling::OPTIMAL,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                vk::ImageCreateFlags::empty(),
            )?
        };
        Ok(properties)
    }

    /// Block until every submitted upload has finished.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            tracing::warn!("Device did not go idle before teardown: {}", e);
        }
        // Allocations must be returned while the device still exists
        self.allocator.lock().shutdown();
        unsafe {
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for [`GpuContext`].
pub struct GpuContextBuilder {
    app_name: String,
    validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "volstream".to_string(),
            validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable the Khronos validation layer.
    pub fn validation(mut self, enable: bool) -> Self {
        self.validation = enable;
        self
    }

    /// Load Vulkan, pick the device with the most 3D texture headroom and
    /// open a queue on it.
    pub fn build(self) -> Result<GpuContext> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Vulkan loader unavailable: {e}")))?;
        let instance = unsafe { create_instance(&entry, &self.app_name, self.validation) }?;
        let physical_device = unsafe { select_physical_device(&instance) }?;

        let capabilities = unsafe { GpuCapabilities::query(&instance, physical_device) };
        if !capabilities.meets_requirements() {
            tracing::warn!("GPU rejected: {}", capabilities.summary());
            return Err(GpuError::NoSuitableDevice);
        }

        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let queue_family = pick_queue_family(&families).ok_or(GpuError::NoSuitableDevice)?;
        let (device, queue) = unsafe { open_device(&instance, physical_device, queue_family)? };
        let device = Arc::new(device);
        let allocator = unsafe { GpuAllocator::new(&instance, device.clone(), physical_device) }?;

        tracing::info!(
            "Selected GPU: {} (queue family {})",
            capabilities.summary(),
            queue_family
        );
        Ok(GpuContext {
            _entry: entry,
            instance,
            physical_device,
            device,
            capabilities,
            allocator: Mutex::new(allocator),
            queue_family,
            queue,
        })
    }
}

/// First family that can both copy into images and sample them in a draw.
fn pick_queue_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .position(|family| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|i| i as u32)
}

/// # Safety
/// The instance and physical device must be valid.
unsafe fn open_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<(ash::Device, vk::Queue)> {
    let priority = [1.0_f32];
    let queues = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(&priority)];
    let info = vk::DeviceCreateInfo::default().queue_create_infos(&queues);

    let device = unsafe { instance.create_device(physical_device, &info, None)? };
    let queue = unsafe { device.get_device_queue(queue_family, 0) };
    Ok((device, queue))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn transfer_only_families_are_passed_over() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 2),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 1),
        ];
        assert_eq!(pick_queue_family(&families), Some(1));
    }

    #[test]
    fn empty_families_yield_nothing() {
        assert_eq!(pick_queue_family(&[family(vk::QueueFlags::GRAPHICS, 0)]), None);
        assert_eq!(pick_queue_family(&[]), None);
    }
}
