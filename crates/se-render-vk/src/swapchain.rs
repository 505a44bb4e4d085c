use crate::error::{Stage, StageExt, VkResult};
use crate::probe;
use crate::select::QueueFamilyIndices;
use ash::khr::{surface, swapchain};
use ash::vk;
use se_render::{RenderSize, WindowSurface};
use tracing::{debug, info};

pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

#[derive(Clone, Debug, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// BGRA8 sRGB if offered, otherwise the first pair the driver reported.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space
        })
        .or_else(|| formats.first().copied())
        .unwrap_or(PREFERRED_FORMAT)
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn extent_from_caps(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 == "no max").
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

/// Concurrent across both families when they differ, exclusive otherwise.
pub fn sharing_for(families: &QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    match (families.graphics_family, families.present_family) {
        (Some(g), Some(p)) if g != p => (vk::SharingMode::CONCURRENT, vec![g, p]),
        _ => (vk::SharingMode::EXCLUSIVE, Vec::new()),
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SwapchainConfiguration {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainConfiguration {
    pub fn negotiate(support: &SwapchainSupport, framebuffer: RenderSize) -> Self {
        let caps = &support.capabilities;
        Self {
            format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes),
            extent: extent_from_caps(caps, framebuffer),
            image_count: choose_image_count(caps),
            pre_transform: caps.current_transform,
        }
    }
}

impl PartialEq for SwapchainConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.format.format == other.format.format
            && self.format.color_space == other.format.color_space
            && self.present_mode == other.present_mode
            && self.extent.width == other.extent.width
            && self.extent.height == other.extent.height
            && self.image_count == other.image_count
            && self.pre_transform == other.pre_transform
    }
}

impl Eq for SwapchainConfiguration {}

/// The support re-query at (re)creation time is part of swapchain creation
/// and fails as such.
fn support_for_creation(
    query: Result<SwapchainSupport, vk::Result>,
) -> VkResult<SwapchainSupport> {
    query.stage(Stage::Swapchain)
}

/// Blocks until the window has a drawable framebuffer.
///
/// Returns `None` if the window is closed while waiting.
pub fn wait_for_drawable(window: &mut dyn WindowSurface) -> Option<RenderSize> {
    let mut size = window.framebuffer_size();
    while size.is_empty() {
        if window.should_close() {
            return None;
        }
        window.wait_events();
        size = window.framebuffer_size();
    }
    Some(size)
}

pub struct SwapchainState {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub config: SwapchainConfiguration,
}

/// Owns the swapchain and everything derived from its images.
pub struct SwapchainManager {
    device: ash::Device,
    loader: swapchain::Device,
    surface_loader: surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    families: QueueFamilyIndices,
    state: Option<SwapchainState>,
}

impl SwapchainManager {
    pub fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        surface_loader: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        families: QueueFamilyIndices,
    ) -> Self {
        Self {
            device: device.clone(),
            loader: swapchain::Device::new(instance, device),
            surface_loader: surface_loader.clone(),
            phys,
            surface,
            families,
            state: None,
        }
    }

    pub fn loader(&self) -> &swapchain::Device {
        &self.loader
    }

    pub fn state(&self) -> Option<&SwapchainState> {
        self.state.as_ref()
    }

    /// Creates swapchain, images and views. Framebuffers come later through
    /// [`Self::attach_framebuffers`], once the render pass for the chosen
    /// format exists.
    pub fn create(&mut self, framebuffer: RenderSize) -> VkResult<&SwapchainState> {
        self.destroy();

        let support = support_for_creation(probe::swapchain_support(
            &self.surface_loader,
            self.phys,
            self.surface,
        ))?;
        let config = SwapchainConfiguration::negotiate(&support, framebuffer);
        let (sharing, family_list) = sharing_for(&self.families);

        info!(
            "swapchain: format {:?} / {:?}, present_mode {:?}, extent {}x{}, images(min={} → picked={}), sharing {:?}",
            config.format.format,
            config.format.color_space,
            config.present_mode,
            config.extent.width,
            config.extent.height,
            support.capabilities.min_image_count,
            config.image_count,
            sharing
        );

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: self.surface,
            min_image_count: config.image_count,
            image_format: config.format.format,
            image_color_space: config.format.color_space,
            image_extent: config.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing,
            queue_family_index_count: family_list.len() as u32,
            p_queue_family_indices: if family_list.is_empty() {
                std::ptr::null()
            } else {
                family_list.as_ptr()
            },
            pre_transform: config.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: config.present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };

        let handle = unsafe { self.loader.create_swapchain(&swap_info, None) }
            .stage(Stage::Swapchain)?;
        // Stored before anything else can fail so destroy() cleans it up.
        let state = self.state.insert(SwapchainState {
            handle,
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            config,
        });

        state.images =
            unsafe { self.loader.get_swapchain_images(handle) }.stage(Stage::Swapchain)?;

        state.image_views.reserve(state.images.len());
        for &image in &state.images {
            let iv_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: config.format.format,
                components: vk::ComponentMapping::default(),
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = unsafe { self.device.create_image_view(&iv_info, None) }
                .stage(Stage::ImageView)?;
            state.image_views.push(view);
        }

        Ok(state)
    }

    /// One framebuffer per image view, bound to `render_pass`.
    pub fn attach_framebuffers(&mut self, render_pass: vk::RenderPass) -> VkResult<()> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };

        for &view in &state.image_views {
            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: 1,
                p_attachments: &view,
                width: state.config.extent.width,
                height: state.config.extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = unsafe { self.device.create_framebuffer(&fb_info, None) }
                .stage(Stage::Framebuffer)?;
            state.framebuffers.push(fb);
        }
        Ok(())
    }

    /// Waits for a drawable window and an idle device, then tears the
    /// swapchain down and builds it again.
    ///
    /// Returns `Ok(None)` when the window closed while minimized; nothing is
    /// destroyed in that case.
    pub fn recreate(&mut self, window: &mut dyn WindowSurface) -> VkResult<Option<&SwapchainState>> {
        let Some(size) = wait_for_drawable(window) else {
            debug!("window closed while minimized, swapchain left as is");
            return Ok(None);
        };

        unsafe { self.device.device_wait_idle() }.stage(Stage::QueueSubmit)?;
        debug!("recreating swapchain for {}x{}", size.width, size.height);
        self.create(size).map(Some)
    }

    /// Framebuffers, then image views, then the swapchain. The images belong
    /// to the swapchain and go with it.
    pub fn destroy(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };
        unsafe {
            for &fb in &state.framebuffers {
                self.device.destroy_framebuffer(fb, None);
            }
            for &iv in &state.image_views {
                self.device.destroy_image_view(iv, None);
            }
            self.loader.destroy_swapchain(state.handle, None);
        }
    }
}

impl Drop for SwapchainManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn free_size_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    #[test]
    fn preferred_format_wins_wherever_it_is() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn falls_back_to_first_reported_format() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            // Right format, wrong color space.
            fmt(
                vk::Format::B8G8R8A8_SRGB,
                vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            ),
        ];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn mailbox_preferred_over_fifo() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn free_extent_is_clamped_per_axis() {
        let e = extent_from_caps(&free_size_caps(), RenderSize::new(8000, 50));
        assert_eq!((e.width, e.height), (4096, 50));

        let mut caps = free_size_caps();
        caps.min_image_extent = vk::Extent2D {
            width: 64,
            height: 64,
        };
        let e = extent_from_caps(&caps, RenderSize::new(10, 5000));
        assert_eq!((e.width, e.height), (64, 4096));
    }

    #[test]
    fn fixed_extent_is_used_verbatim() {
        let mut caps = free_size_caps();
        caps.current_extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let e = extent_from_caps(&caps, RenderSize::new(8000, 50));
        assert_eq!((e.width, e.height), (1280, 720));
    }

    #[test]
    fn image_count_is_min_plus_one_within_max() {
        let mut caps = free_size_caps();
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);

        caps.max_image_count = 0;
        caps.min_image_count = 7;
        assert_eq!(choose_image_count(&caps), 8);
    }

    #[test]
    fn sharing_follows_family_split() {
        let same = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        let (mode, list) = sharing_for(&same);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(list.is_empty());

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        let (mode, list) = sharing_for(&split);
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(list, vec![0, 2]);
    }

    #[test]
    fn negotiation_is_idempotent_for_unchanged_inputs() {
        let support = SwapchainSupport {
            capabilities: free_size_caps(),
            formats: vec![
                fmt(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                PREFERRED_FORMAT,
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };
        let size = RenderSize::new(1024, 768);

        let first = SwapchainConfiguration::negotiate(&support, size);
        let second = SwapchainConfiguration::negotiate(&support, size);
        assert_eq!(first, second);
        assert_eq!(first.image_count, 3);
        assert_eq!(first.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!((first.extent.width, first.extent.height), (1024, 768));

        let resized = SwapchainConfiguration::negotiate(&support, RenderSize::new(640, 480));
        assert_ne!(first, resized);
    }

    #[test]
    fn failed_support_requery_is_a_swapchain_creation_error() {
        let err = support_for_creation(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::VkError::SwapchainCreation {
                stage: Stage::Swapchain,
                result: vk::Result::ERROR_SURFACE_LOST_KHR,
            }
        ));
        assert_eq!(err.exit_code(), 6);
    }

    struct MinimizedWindow {
        waits_until_restored: u32,
        waits: u32,
        closed: bool,
    }

    impl WindowSurface for MinimizedWindow {
        fn framebuffer_size(&self) -> RenderSize {
            if self.waits >= self.waits_until_restored {
                RenderSize::new(800, 600)
            } else {
                RenderSize::new(800, 0)
            }
        }

        fn wait_events(&mut self) {
            self.waits += 1;
        }

        fn should_close(&self) -> bool {
            self.closed
        }
    }

    #[test]
    fn waits_for_events_until_the_window_is_drawable() {
        let mut window = MinimizedWindow {
            waits_until_restored: 3,
            waits: 0,
            closed: false,
        };
        assert_eq!(wait_for_drawable(&mut window), Some(RenderSize::new(800, 600)));
        assert_eq!(window.waits, 3);
    }

    #[test]
    fn drawable_window_does_not_wait() {
        let mut window = MinimizedWindow {
            waits_until_restored: 0,
            waits: 0,
            closed: false,
        };
        assert!(wait_for_drawable(&mut window).is_some());
        assert_eq!(window.waits, 0);
    }

    #[test]
    fn closing_while_minimized_stops_waiting() {
        let mut window = MinimizedWindow {
            waits_until_restored: u32::MAX,
            waits: 0,
            closed: true,
        };
        assert_eq!(wait_for_drawable(&mut window), None);
    }
}
