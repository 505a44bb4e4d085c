//! Vulkan presentation core: adapter selection, swapchain lifecycle, the
//! triangle pipeline and the double-buffered frame loop.

pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod pipeline;
pub mod probe;
pub mod renderer;
pub mod scheduler;
pub mod select;
pub mod swapchain;

pub use error::{Stage, VkError, VkResult};
pub use frame::MAX_FRAMES_IN_FLIGHT;
pub use instance::Validation;
pub use renderer::{VkRenderer, VkRendererConfig, DEFAULT_CLEAR};
pub use scheduler::{Acquired, FrameBackend, FrameOutcome, FrameScheduler, Presented};
