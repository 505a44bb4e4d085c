// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use std::{cell::Cell, rc::Rc};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True while either axis is zero (minimized window).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What the renderer needs from the window it presents into.
pub trait WindowSurface {
    /// Current framebuffer size in pixels.
    fn framebuffer_size(&self) -> RenderSize;

    /// Blocks until the windowing system delivers at least one event.
    fn wait_events(&mut self);

    /// Set once the user asked to close; blocking waits give up early.
    fn should_close(&self) -> bool {
        false
    }
}

/// Single-threaded "resize pending" flag.
///
/// The scheduler owns one and hands clones to the windowing layer, whose
/// resize callback calls [`ResizeSignal::notify`]. The scheduler consumes it
/// with [`ResizeSignal::take`] after presenting.
#[derive(Clone, Debug, Default)]
pub struct ResizeSignal(Rc<Cell<bool>>);

impl ResizeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.0.set(true);
    }

    pub fn is_pending(&self) -> bool {
        self.0.get()
    }

    /// Returns the flag and clears it.
    pub fn take(&self) -> bool {
        self.0.replace(false)
    }
}

pub trait Renderer {
    /// Runs one iteration of the frame loop.
    fn draw_frame(&mut self, window: &mut dyn WindowSurface) -> Result<()>;

    /// Handle for the windowing layer's resize callback.
    fn resize_signal(&self) -> ResizeSignal;

    /// Waits until the GPU has finished all submitted work.
    fn wait_idle(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_signal_is_shared_between_clones() {
        let owner = ResizeSignal::new();
        let callback_side = owner.clone();

        assert!(!owner.is_pending());
        callback_side.notify();
        assert!(owner.is_pending());
        assert!(owner.take());
        assert!(!owner.take());
        assert!(!callback_side.is_pending());
    }

    #[test]
    fn empty_size_in_either_axis() {
        assert!(RenderSize::new(0, 600).is_empty());
        assert!(RenderSize::new(800, 0).is_empty());
        assert!(!RenderSize::new(1, 1).is_empty());
    }
}
