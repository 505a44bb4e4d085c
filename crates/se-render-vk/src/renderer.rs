use crate::device::LogicalDevice;
use crate::error::{Stage, StageExt, VkError, VkResult};
use crate::frame::FramePool;
use crate::instance::{Surface, Validation, VulkanInstance};
use crate::pipeline::{GraphicsPipeline, ShaderBlobs};
use crate::scheduler::{Acquired, FrameBackend, FrameScheduler, Presented};
use crate::swapchain::{SwapchainManager, SwapchainState};
use crate::{probe, select};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use se_render::{RenderSize, Renderer, ResizeSignal, WindowSurface};
use std::path::PathBuf;
use tracing::{debug, info};

pub const DEFAULT_CLEAR: [f32; 4] = [0.02, 0.02, 0.04, 1.0];

#[derive(Clone, Debug)]
pub struct VkRendererConfig {
    pub validation: Validation,
    /// Directory holding `vert.spv` and `frag.spv`.
    pub shader_dir: PathBuf,
    pub clear_color: [f32; 4],
}

/// Everything the frame protocol touches on the GPU side.
///
/// Field order is teardown order: per-frame objects, then the swapchain and
/// the pipeline built for it, then the device, the surface and the instance.
struct VkBackend {
    frames: FramePool,
    swapchain: SwapchainManager,
    pipeline: Option<GraphicsPipeline>,
    shaders: ShaderBlobs,
    clear: vk::ClearValue,
    device: LogicalDevice,
    _surface: Surface,
    _instance: VulkanInstance,
}

impl VkBackend {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cfg: &VkRendererConfig,
    ) -> VkResult<Self> {
        let dh = display.display_handle()?.as_raw();
        let wh = window.window_handle()?.as_raw();

        let instance = VulkanInstance::new(dh, cfg.validation)?;
        let surface = Surface::new(&instance, dh, wh)?;

        let candidates = probe::candidates(instance.raw(), surface.loader(), surface.handle())?;
        let selected = select::select(candidates)?;
        let device = LogicalDevice::create(instance.raw(), &selected, instance.layers())?;

        let mut swapchain = SwapchainManager::new(
            instance.raw(),
            device.raw(),
            surface.loader(),
            selected.candidate.handle,
            surface.handle(),
            device.families,
        );
        let format = swapchain.create(size)?.config.format.format;

        let shaders = ShaderBlobs::load(&cfg.shader_dir)?;
        let pipeline = GraphicsPipeline::build(device.raw(), format, &shaders)?;
        swapchain.attach_framebuffers(pipeline.render_pass)?;

        let graphics_family = device
            .families
            .graphics_family
            .ok_or(VkError::NoSuitableDevice)?;
        let frames = FramePool::new(device.raw(), graphics_family)?;

        Ok(Self {
            frames,
            swapchain,
            pipeline: Some(pipeline),
            shaders,
            clear: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: cfg.clear_color,
                },
            },
            device,
            _surface: surface,
            _instance: instance,
        })
    }

    /// Swapchain state and the pipeline matching it.
    fn target(&self) -> VkResult<(&SwapchainState, &GraphicsPipeline)> {
        match (self.swapchain.state(), self.pipeline.as_ref()) {
            (Some(state), Some(pipeline)) => Ok((state, pipeline)),
            _ => Err(VkError::Api {
                stage: Stage::CommandRecording,
                result: vk::Result::ERROR_INITIALIZATION_FAILED,
            }),
        }
    }
}

impl FrameBackend for VkBackend {
    fn wait_for_slot(&mut self, slot: usize) -> VkResult<()> {
        self.frames.wait(slot)
    }

    fn acquire_image(&mut self, slot: usize) -> VkResult<Acquired> {
        let (state, _) = self.target()?;
        let image_available = self.frames.slot(slot).image_available;
        let res = unsafe {
            self.swapchain.loader().acquire_next_image(
                state.handle,
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        };
        match res {
            Ok((index, suboptimal)) => Ok(Acquired::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::Stale),
            Err(e) => Err(e).stage(Stage::Presentation),
        }
    }

    fn reset_slot(&mut self, slot: usize) -> VkResult<()> {
        self.frames.reset(slot)
    }

    fn record(&mut self, slot: usize, image_index: u32) -> VkResult<()> {
        let (state, pipeline) = self.target()?;
        let d = self.device.raw();
        let cmd = self.frames.slot(slot).command_buffer;
        let extent = state.config.extent;
        let framebuffer = state.framebuffers[image_index as usize];

        unsafe {
            d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .stage(Stage::CommandRecording)?;
            let begin = vk::CommandBufferBeginInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
                ..Default::default()
            };
            d.begin_command_buffer(cmd, &begin)
                .stage(Stage::CommandRecording)?;

            let clears = [self.clear];
            let rp_begin = vk::RenderPassBeginInfo {
                s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
                render_pass: pipeline.render_pass,
                framebuffer,
                render_area: vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                },
                clear_value_count: clears.len() as u32,
                p_clear_values: clears.as_ptr(),
                ..Default::default()
            };
            d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
            d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.pipeline);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            d.cmd_set_viewport(cmd, 0, &[viewport]);
            d.cmd_set_scissor(
                cmd,
                0,
                &[vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                }],
            );

            d.cmd_draw(cmd, 3, 1, 0, 0);
            d.cmd_end_render_pass(cmd);
            d.end_command_buffer(cmd).stage(Stage::CommandRecording)?;
        }
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> VkResult<()> {
        let s = *self.frames.slot(slot);
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.image_available,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &s.command_buffer,
            signal_semaphore_count: 1,
            p_signal_semaphores: &s.render_finished,
            ..Default::default()
        };
        unsafe {
            self.device.raw().queue_submit(
                self.device.graphics_queue,
                std::slice::from_ref(&submit),
                s.in_flight,
            )
        }
        .stage(Stage::QueueSubmit)
    }

    fn present(&mut self, slot: usize, image_index: u32) -> VkResult<Presented> {
        let (state, _) = self.target()?;
        let render_finished = self.frames.slot(slot).render_finished;
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &render_finished,
            swapchain_count: 1,
            p_swapchains: &state.handle,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let res = unsafe {
            self.swapchain
                .loader()
                .queue_present(self.device.present_queue, &present)
        };
        match res {
            Ok(false) => Ok(Presented::Optimal),
            Ok(true) => Ok(Presented::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Presented::Stale),
            Err(e) => Err(e).stage(Stage::Presentation),
        }
    }

    fn recreate_swapchain(&mut self, window: &mut dyn WindowSurface) -> VkResult<()> {
        let format = match self.swapchain.recreate(window)? {
            Some(state) => state.config.format.format,
            None => return Ok(()),
        };

        // The device is idle here; the old pipeline can go before the new one
        // is built for the (possibly changed) format.
        self.pipeline = None;
        let pipeline = GraphicsPipeline::build(self.device.raw(), format, &self.shaders)?;
        self.swapchain.attach_framebuffers(pipeline.render_pass)?;
        self.pipeline = Some(pipeline);
        Ok(())
    }
}

impl Drop for VkBackend {
    fn drop(&mut self) {
        debug!("waiting for device idle before teardown");
        self.device.wait_idle().ok();
    }
}

/// Vulkan implementation of [`Renderer`].
pub struct VkRenderer {
    scheduler: FrameScheduler,
    backend: VkBackend,
}

impl VkRenderer {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cfg: &VkRendererConfig,
    ) -> VkResult<Self> {
        let backend = VkBackend::new(window, display, size, cfg)?;
        if let Some(state) = backend.swapchain.state() {
            info!(
                "Vulkan swapchain ready ({}x{}, fmt 0x{:x})",
                state.config.extent.width,
                state.config.extent.height,
                state.config.format.format.as_raw()
            );
        }
        Ok(Self {
            scheduler: FrameScheduler::new(),
            backend,
        })
    }

    pub fn current_frame(&self) -> usize {
        self.scheduler.current_frame()
    }
}

impl Renderer for VkRenderer {
    fn draw_frame(&mut self, window: &mut dyn WindowSurface) -> anyhow::Result<()> {
        self.scheduler.draw_frame(&mut self.backend, window)?;
        Ok(())
    }

    fn resize_signal(&self) -> ResizeSignal {
        self.scheduler.resize_signal()
    }

    fn wait_idle(&mut self) -> anyhow::Result<()> {
        self.backend.device.wait_idle()?;
        Ok(())
    }
}
