//! Fences for frame slot retirement

use ash::{vk, Device};

use crate::backend::GpuFence;
use crate::error::BindingResult;

/// Fence wrapper with RAII cleanup
pub struct AshFence {
    device: Device,
    fence: vk::Fence,
}

impl AshFence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> BindingResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    /// Get the fence handle, for `vkQueueSubmit`
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl GpuFence for AshFence {
    fn is_signaled(&self) -> BindingResult<bool> {
        Ok(unsafe { self.device.get_fence_status(self.fence)? })
    }

    fn wait(&self, timeout_ns: u64) -> BindingResult<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, timeout_ns)? };
        Ok(())
    }

    fn reset(&self) -> BindingResult<()> {
        unsafe { self.device.reset_fences(&[self.fence])? };
        Ok(())
    }
}

impl Drop for AshFence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}
