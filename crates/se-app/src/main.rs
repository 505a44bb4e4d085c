// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::{AppCfg, ValidationCfg, DEFAULT_CONFIG_PATH};
use se_core::init_tracing;
use se_platform::PlatformWindow;
use se_render::{Renderer, WindowSurface};
use se_render_vk::pipeline::VERT_FILE;
use se_render_vk::{VkError, VkRenderer, VkRendererConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; missing means defaults
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Validation layer policy
    #[arg(long, value_enum)]
    validation: Option<ValidationCfg>,
    /// Directory holding vert.spv and frag.spv
    #[arg(long)]
    shader_dir: Option<PathBuf>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
}

impl Args {
    /// CLI flags win over the file.
    fn apply(&self, cfg: &mut AppCfg) {
        if let Some(v) = self.validation {
            cfg.render.validation = v;
        }
        if let Some(dir) = &self.shader_dir {
            cfg.render.shader_dir = Some(dir.clone());
        }
        if let Some(w) = self.width {
            cfg.window.width = w;
        }
        if let Some(h) = self.height {
            cfg.window.height = h;
        }
    }
}

/// Shader blobs are looked up relative to the working directory.
const DEFAULT_SHADER_DIR: &str = "shaders";

/// `relative` when it holds the compiled blobs. Debug builds run from the
/// source tree fall back to where build.rs wrote them.
fn default_shader_dir(relative: &Path) -> PathBuf {
    if cfg!(debug_assertions) && !relative.join(VERT_FILE).is_file() {
        debug!(
            "no {VERT_FILE} under {}, using build output",
            relative.display()
        );
        return PathBuf::from(env!("OUT_DIR"));
    }
    relative.to_path_buf()
}

fn renderer_config(cfg: &AppCfg) -> VkRendererConfig {
    VkRendererConfig {
        validation: cfg.render.validation.into(),
        shader_dir: cfg
            .render
            .shader_dir
            .clone()
            .unwrap_or_else(|| default_shader_dir(Path::new(DEFAULT_SHADER_DIR))),
        clear_color: cfg.render.clear_color,
    }
}

fn run(args: Args) -> Result<()> {
    let mut cfg = AppCfg::load(&args.config)?;
    args.apply(&mut cfg);
    debug!("config = {cfg:?}");

    // Declared before the renderer so the surface goes first on drop.
    let mut window = PlatformWindow::new(&cfg.window.to_window_config())?;

    let vk_cfg = renderer_config(&cfg);
    info!(
        "validation = {:?}, shaders from {}",
        vk_cfg.validation,
        vk_cfg.shader_dir.display()
    );
    let mut renderer = VkRenderer::new(
        window.window(),
        window.window(),
        window.framebuffer_size(),
        &vk_cfg,
    )
    .context("vulkan init")?;

    let resize = renderer.resize_signal();
    window.on_resize(move |_| resize.notify());

    let mut frames = 0u32;
    let mut last_fps_instant = Instant::now();

    loop {
        window.poll_events();
        if window.should_close() {
            break;
        }

        renderer.draw_frame(&mut window)?;
        frames = frames.saturating_add(1);

        let now = Instant::now();
        if now.duration_since(last_fps_instant).as_secs_f32() >= 1.0 {
            debug!("fps ~ {}", frames);
            frames = 0;
            last_fps_instant = now;
        }
    }

    info!("shutting down");
    renderer.wait_idle()?;
    Ok(())
}

/// Backend failures carry their own code; anything else is a startup error.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<VkError>()
        .map_or(1, VkError::exit_code)
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = exit_code(&e);
            error!("{e:#} (exit {code})");
            ExitCode::from(code)
        }
    }
}
