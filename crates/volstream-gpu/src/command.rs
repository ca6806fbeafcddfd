//! Command recording for texture transfers.

use crate::error::{GpuError, Result};
use crate::sync::{UploadFence, UPLOAD_TIMEOUT};
use ash::vk;

/// One reusable primary command buffer and the fence that guards it.
///
/// Every submission blocks until the GPU is done, so the buffer is always
/// free to re-record and staging memory may be reused right after.
pub struct TransferCommands {
    pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
    fence: UploadFence,
    queue_family: u32,
}

impl TransferCommands {
    /// Create the pool, buffer and fence.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(device: &ash::Device, queue_family: u32) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = device.create_command_pool(&create_info, None)?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = match device.allocate_command_buffers(&alloc_info) {
            Ok(buffers) => buffers.into_iter().next(),
            Err(e) => {
                device.destroy_command_pool(pool, None);
                return Err(e.into());
            }
        };
        let Some(cmd) = cmd else {
            device.destroy_command_pool(pool, None);
            return Err(GpuError::InvalidState("No command buffer allocated".to_string()));
        };

        match UploadFence::new(device) {
            Ok(fence) => Ok(Self {
                pool,
                cmd,
                fence,
                queue_family,
            }),
            Err(e) => {
                device.destroy_command_pool(pool, None);
                Err(e)
            }
        }
    }

    /// Queue family the commands are submitted to.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Record commands with `f`, submit them to `queue` and wait.
    ///
    /// # Safety
    /// All handles must be valid and `queue` must belong to the pool's family.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn submit_and_wait<F>(&self, device: &ash::Device, queue: vk::Queue, f: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        device.reset_command_buffer(self.cmd, vk::CommandBufferResetFlags::empty())?;
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device.begin_command_buffer(self.cmd, &begin_info)?;
        f(self.cmd);
        device.end_command_buffer(self.cmd)?;

        let cmd_buffers = [self.cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&cmd_buffers);
        device.queue_submit(queue, &[submit_info], self.fence.handle())?;
        self.fence.wait_and_reset(device, UPLOAD_TIMEOUT)
    }

    /// Destroy the fence and the pool with its buffer.
    ///
    /// # Safety
    /// The device must be valid and no submission may be in flight.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        self.fence.destroy(device);
        device.destroy_command_pool(self.pool, None);
    }
}
