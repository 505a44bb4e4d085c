//! Per-frame acquire → record → submit → present protocol.
//!
//! The scheduler owns only the frame cursor and the resize flag. Every driver
//! call goes through [`FrameBackend`], which lets the protocol run against a
//! scripted backend in tests.

use crate::error::VkResult;
use crate::frame::MAX_FRAMES_IN_FLIGHT;
use se_render::{ResizeSignal, WindowSurface};
use tracing::{debug, trace};

/// Result of asking the swapchain for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    Image { index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface (`ERROR_OUT_OF_DATE_KHR`).
    Stale,
}

/// Result of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presented {
    Optimal,
    Suboptimal,
    Stale,
}

/// What one call to [`FrameScheduler::draw_frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Image presented, swapchain still valid.
    Presented,
    /// Image presented (or presentation went stale), then the swapchain was
    /// rebuilt.
    Recreated,
    /// Acquire went stale: nothing was submitted and the cursor did not move.
    Abandoned,
}

/// Driver operations the frame protocol is built from.
///
/// `slot` is always in `0..MAX_FRAMES_IN_FLIGHT`.
pub trait FrameBackend {
    /// Blocks until the slot's previous submission has retired.
    fn wait_for_slot(&mut self, slot: usize) -> VkResult<()>;
    /// Signals the slot's image-available semaphore on success.
    fn acquire_image(&mut self, slot: usize) -> VkResult<Acquired>;
    /// Returns the slot's fence to the unsignaled state.
    fn reset_slot(&mut self, slot: usize) -> VkResult<()>;
    fn record(&mut self, slot: usize, image_index: u32) -> VkResult<()>;
    fn submit(&mut self, slot: usize) -> VkResult<()>;
    fn present(&mut self, slot: usize, image_index: u32) -> VkResult<Presented>;
    fn recreate_swapchain(&mut self, window: &mut dyn WindowSurface) -> VkResult<()>;
}

#[derive(Debug, Default)]
pub struct FrameScheduler {
    current_frame: usize,
    resize: ResizeSignal,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Handle for the window layer. Setting it forces a recreation after the
    /// next present.
    pub fn resize_signal(&self) -> ResizeSignal {
        self.resize.clone()
    }

    pub fn draw_frame<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        window: &mut dyn WindowSurface,
    ) -> VkResult<FrameOutcome> {
        let slot = self.current_frame;

        backend.wait_for_slot(slot)?;

        let (image_index, acquire_suboptimal) = match backend.acquire_image(slot)? {
            Acquired::Image { index, suboptimal } => (index, suboptimal),
            Acquired::Stale => {
                // The fence is still signaled, so the next wait on this slot
                // returns at once.
                debug!("acquire out of date, recreating swapchain");
                self.resize.take();
                backend.recreate_swapchain(window)?;
                return Ok(FrameOutcome::Abandoned);
            }
        };

        backend.reset_slot(slot)?;
        backend.record(slot, image_index)?;
        backend.submit(slot)?;
        let presented = backend.present(slot, image_index)?;

        let resized = self.resize.take();
        let outcome = if resized || acquire_suboptimal || presented != Presented::Optimal {
            debug!(
                "recreating swapchain (resized: {resized}, acquire suboptimal: {acquire_suboptimal}, present: {presented:?})"
            );
            backend.recreate_swapchain(window)?;
            FrameOutcome::Recreated
        } else {
            FrameOutcome::Presented
        };

        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
        trace!("frame slot {slot} image {image_index}: {outcome:?}");
        Ok(outcome)
    }
}
