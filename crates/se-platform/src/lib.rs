// SPDX-License-Identifier: CEPL-1.0
//! Windowing collaborator on top of winit.
//!
//! The render loop is host driven: the caller polls events once per frame and
//! the renderer may block in [`WindowSurface::wait_events`] while the window is
//! minimized. Both map onto winit's pump-events API, so the event loop never
//! owns the main loop.
pub use winit;

use anyhow::{anyhow, Context, Result};
use se_render::{RenderSize, WindowSurface};
use std::time::Duration;
use tracing::{debug, info};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    error::OsError,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

#[derive(Clone, Debug)]
pub struct WindowConfig {
    pub title: String,
    pub size: RenderSize,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "SeEngine".to_owned(),
            size: RenderSize::new(800, 600),
            resizable: true,
        }
    }
}

type ResizeCallback = Box<dyn FnMut(RenderSize)>;

struct WindowState {
    attributes: Option<WindowAttributes>,
    created: Option<Result<Window, OsError>>,
    close_requested: bool,
    on_resize: Option<ResizeCallback>,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        if let Some(attributes) = self.attributes.take() {
            self.created = Some(event_loop.create_window(attributes));
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                let size = RenderSize::new(size.width, size.height);
                debug!("Resized → {}x{}", size.width, size.height);
                if let Some(cb) = self.on_resize.as_mut() {
                    cb(size);
                }
            }
            _ => {}
        }
    }
}

pub struct PlatformWindow {
    // Dropped before the event loop.
    window: Window,
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl PlatformWindow {
    pub fn new(cfg: &WindowConfig) -> Result<Self> {
        let mut event_loop = EventLoop::new().context("create event loop")?;

        let attributes = Window::default_attributes()
            .with_title(cfg.title.clone())
            .with_inner_size(LogicalSize::new(cfg.size.width, cfg.size.height))
            .with_resizable(cfg.resizable);

        let mut state = WindowState {
            attributes: Some(attributes),
            created: None,
            close_requested: false,
            on_resize: None,
        };

        // The window can only be created from inside `resumed`.
        let window = loop {
            if let PumpStatus::Exit(code) =
                event_loop.pump_app_events(Some(Duration::ZERO), &mut state)
            {
                return Err(anyhow!(
                    "event loop exited with {code} before the window was created"
                ));
            }
            if let Some(created) = state.created.take() {
                break created.context("create_window")?;
            }
        };

        let size = window.inner_size();
        info!(
            "window '{}' ready ({}x{}, resizable={})",
            cfg.title, size.width, size.height, cfg.resizable
        );

        Ok(Self {
            window,
            state,
            event_loop,
        })
    }

    /// Underlying winit window, for raw window/display handles.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Registers the resize notification. Replaces any earlier callback.
    pub fn on_resize(&mut self, callback: impl FnMut(RenderSize) + 'static) {
        self.state.on_resize = Some(Box::new(callback));
    }

    /// Processes pending events without blocking.
    pub fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    pub fn should_close(&self) -> bool {
        self.state.close_requested
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            debug!("event loop exited with {code}");
            self.state.close_requested = true;
        }
    }
}

impl WindowSurface for PlatformWindow {
    fn framebuffer_size(&self) -> RenderSize {
        let size = self.window.inner_size();
        RenderSize::new(size.width, size.height)
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }

    fn should_close(&self) -> bool {
        self.state.close_requested
    }
}
