//! Synchronization primitives.

use crate::error::{GpuError, Result};
use ash::vk;
use std::time::Duration;

/// Longest a single upload may take before it is reported as stuck.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// A fence reused for every blocking transfer submission.
pub struct UploadFence {
    fence: vk::Fence,
}

impl UploadFence {
    /// Create an unsignaled upload fence.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let fence = device.create_fence(&vk::FenceCreateInfo::default(), None)?;
        Ok(Self { fence })
    }

    /// Raw fence handle.
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Block until the last submission completes, then reset for reuse.
    ///
    /// # Safety
    /// The device must be valid and the fence must have been submitted.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub unsafe fn wait_and_reset(&self, device: &ash::Device, timeout: Duration) -> Result<()> {
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        match device.wait_for_fences(&[self.fence], true, timeout_ns) {
            Ok(()) => {}
            Err(vk::Result::TIMEOUT) => {
                return Err(GpuError::InvalidState(format!(
                    "upload did not complete within {timeout:?}"
                )));
            }
            Err(e) => return Err(e.into()),
        }
        device.reset_fences(&[self.fence])?;
        Ok(())
    }

    /// Destroy the fence.
    ///
    /// # Safety
    /// The device must be valid and the fence must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_fence(self.fence, None);
    }
}
