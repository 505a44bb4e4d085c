use crate::error::{Stage, StageExt, VkResult};
use ash::vk;

/// Frames the host may have submitted but not yet seen complete.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Per-slot synchronization and command buffer.
///
/// ```text
/// wait in_flight → acquire (signals image_available) → record command_buffer
///   → submit (waits image_available @ COLOR_ATTACHMENT_OUTPUT,
///             signals render_finished + in_flight)
///   → present (waits render_finished)
/// ```
#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
}

/// Fixed pool of [`FrameSlot`]s. Created once, never resized, untouched by
/// swapchain recreation.
pub struct FramePool {
    device: ash::Device,
    command_pool: vk::CommandPool,
    slots: Vec<FrameSlot>,
}

impl FramePool {
    pub fn new(device: &ash::Device, graphics_family: u32) -> VkResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            // command buffers are reset one at a time before re-recording
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: graphics_family,
            ..Default::default()
        };
        let command_pool =
            unsafe { device.create_command_pool(&pool_info, None) }.stage(Stage::CommandPool)?;

        let mut pool = Self {
            device: device.clone(),
            command_pool,
            slots: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
        };

        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: MAX_FRAMES_IN_FLIGHT as u32,
            ..Default::default()
        };
        let cmd_bufs =
            unsafe { device.allocate_command_buffers(&alloc_info) }.stage(Stage::CommandPool)?;

        let sem_ci = vk::SemaphoreCreateInfo::default();
        // Signaled so the first wait on each slot returns immediately.
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };

        for command_buffer in cmd_bufs {
            unsafe {
                let image_available =
                    device.create_semaphore(&sem_ci, None).stage(Stage::SyncObjects)?;
                let render_finished = match device.create_semaphore(&sem_ci, None) {
                    Ok(s) => s,
                    Err(e) => {
                        device.destroy_semaphore(image_available, None);
                        return Err(e).stage(Stage::SyncObjects);
                    }
                };
                let in_flight = match device.create_fence(&fence_ci, None) {
                    Ok(f) => f,
                    Err(e) => {
                        device.destroy_semaphore(image_available, None);
                        device.destroy_semaphore(render_finished, None);
                        return Err(e).stage(Stage::SyncObjects);
                    }
                };
                pool.slots.push(FrameSlot {
                    image_available,
                    render_finished,
                    in_flight,
                    command_buffer,
                });
            }
        }

        Ok(pool)
    }

    pub fn slot(&self, index: usize) -> &FrameSlot {
        &self.slots[index]
    }

    /// Blocks until the slot's previous submission has completed.
    pub fn wait(&self, index: usize) -> VkResult<()> {
        let fence = self.slots[index].in_flight;
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }
            .stage(Stage::QueueSubmit)
    }

    pub fn reset(&self, index: usize) -> VkResult<()> {
        let fence = self.slots[index].in_flight;
        unsafe { self.device.reset_fences(&[fence]) }.stage(Stage::QueueSubmit)
    }
}

impl Drop for FramePool {
    fn drop(&mut self) {
        // Callers idle the device first; a slot reset by a failed frame never
        // signals again, so its fence must not be waited on here.
        unsafe {
            for s in &self.slots {
                self.device.destroy_fence(s.in_flight, None);
                self.device.destroy_semaphore(s.render_finished, None);
                self.device.destroy_semaphore(s.image_available, None);
            }
            // Frees the command buffers with it.
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
