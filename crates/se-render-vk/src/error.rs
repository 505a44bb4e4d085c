//! Typed failures of the Vulkan backend and their process exit codes.

use ash::vk;
use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// Step of initialisation or of the frame loop that failed.
///
/// Each stage owns one process exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Instance,
    ValidationLayers,
    DeviceEnumeration,
    LogicalDevice,
    Surface,
    Swapchain,
    ImageView,
    ShaderModule,
    RenderPass,
    PipelineLayout,
    GraphicsPipeline,
    Framebuffer,
    CommandPool,
    SyncObjects,
    CommandRecording,
    QueueSubmit,
    Presentation,
}

impl Stage {
    pub const ALL: [Stage; 17] = [
        Stage::Instance,
        Stage::ValidationLayers,
        Stage::DeviceEnumeration,
        Stage::LogicalDevice,
        Stage::Surface,
        Stage::Swapchain,
        Stage::ImageView,
        Stage::ShaderModule,
        Stage::RenderPass,
        Stage::PipelineLayout,
        Stage::GraphicsPipeline,
        Stage::Framebuffer,
        Stage::CommandPool,
        Stage::SyncObjects,
        Stage::CommandRecording,
        Stage::QueueSubmit,
        Stage::Presentation,
    ];

    pub fn exit_code(self) -> u8 {
        match self {
            Stage::Instance => 1,
            Stage::ValidationLayers => 2,
            Stage::DeviceEnumeration => 3,
            Stage::LogicalDevice => 4,
            Stage::Surface => 5,
            Stage::Swapchain => 6,
            Stage::ImageView => 7,
            Stage::ShaderModule => 8,
            Stage::RenderPass => 9,
            Stage::PipelineLayout => 10,
            Stage::GraphicsPipeline => 11,
            Stage::Framebuffer => 12,
            Stage::CommandPool => 13,
            Stage::SyncObjects => 14,
            Stage::CommandRecording => 15,
            Stage::QueueSubmit => 16,
            Stage::Presentation => 17,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Instance => "instance creation",
            Stage::ValidationLayers => "validation layers",
            Stage::DeviceEnumeration => "device enumeration",
            Stage::LogicalDevice => "logical device creation",
            Stage::Surface => "surface",
            Stage::Swapchain => "swapchain creation",
            Stage::ImageView => "image view creation",
            Stage::ShaderModule => "shader module",
            Stage::RenderPass => "render pass creation",
            Stage::PipelineLayout => "pipeline layout creation",
            Stage::GraphicsPipeline => "graphics pipeline creation",
            Stage::Framebuffer => "framebuffer creation",
            Stage::CommandPool => "command pool/buffer allocation",
            Stage::SyncObjects => "sync object creation",
            Stage::CommandRecording => "command buffer recording",
            Stage::QueueSubmit => "queue submission",
            Stage::Presentation => "acquire/present",
        }
    }

    /// Stages owned by the swapchain manager.
    fn is_swapchain(self) -> bool {
        matches!(
            self,
            Stage::Swapchain | Stage::ImageView | Stage::Framebuffer
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum VkError {
    #[error("failed to load the Vulkan loader: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("{stage} failed: {result}")]
    Api { stage: Stage, result: vk::Result },

    #[error("swapchain creation failed at {stage}: {result}")]
    SwapchainCreation { stage: Stage, result: vk::Result },

    #[error("required layer {0} is not available")]
    MissingLayer(String),

    #[error("no suitable physical device")]
    NoSuitableDevice,

    #[error("failed to read shader {path}: {source}")]
    ShaderIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
}

impl VkError {
    pub fn stage(&self) -> Stage {
        match self {
            VkError::Loading(_) => Stage::Instance,
            VkError::Api { stage, .. } | VkError::SwapchainCreation { stage, .. } => *stage,
            VkError::MissingLayer(_) => Stage::ValidationLayers,
            VkError::NoSuitableDevice => Stage::DeviceEnumeration,
            VkError::ShaderIo { .. } => Stage::ShaderModule,
            VkError::WindowHandle(_) => Stage::Surface,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.stage().exit_code()
    }
}

pub type VkResult<T> = std::result::Result<T, VkError>;

/// Tags a raw `vk::Result` with the stage it came from.
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> VkResult<T>;
}

impl<T> StageExt<T> for Result<T, vk::Result> {
    fn stage(self, stage: Stage) -> VkResult<T> {
        self.map_err(|result| {
            if stage.is_swapchain() {
                VkError::SwapchainCreation { stage, result }
            } else {
                VkError::Api { stage, result }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn exit_codes_are_distinct_and_in_range() {
        let codes: HashSet<u8> = Stage::ALL.iter().map(|s| s.exit_code()).collect();
        assert_eq!(codes.len(), Stage::ALL.len());
        assert!(codes.iter().all(|&c| (1..=17).contains(&c)));
    }

    #[test]
    fn swapchain_stages_map_to_swapchain_creation() {
        let err = Err::<(), _>(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
            .stage(Stage::ImageView)
            .unwrap_err();
        assert!(matches!(
            err,
            VkError::SwapchainCreation {
                stage: Stage::ImageView,
                ..
            }
        ));
        assert_eq!(err.exit_code(), 7);
        assert!(err.to_string().contains("image view creation"));
    }

    #[test]
    fn other_stages_map_to_api_errors() {
        let err = Err::<(), _>(vk::Result::ERROR_INITIALIZATION_FAILED)
            .stage(Stage::LogicalDevice)
            .unwrap_err();
        assert!(matches!(
            err,
            VkError::Api {
                stage: Stage::LogicalDevice,
                ..
            }
        ));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn non_api_errors_have_stage_codes() {
        assert_eq!(VkError::NoSuitableDevice.exit_code(), 3);
        assert_eq!(VkError::MissingLayer("VK_LAYER_x".into()).exit_code(), 2);
        let io = VkError::ShaderIo {
            path: "shaders/vert.spv".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(io.exit_code(), 8);
    }

    #[test]
    fn window_handle_errors_are_surface_failures() {
        let err = VkError::from(raw_window_handle::HandleError::Unavailable);
        assert_eq!(err.stage(), Stage::Surface);
        assert_eq!(err.exit_code(), 5);
        assert!(std::error::Error::source(&err).is_some());
    }
}
