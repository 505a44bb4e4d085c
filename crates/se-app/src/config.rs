// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use se_platform::WindowConfig;
use se_render::RenderSize;
use se_render_vk::Validation;
use serde::Deserialize;
use std::{fs, io, path::Path, path::PathBuf};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "se.toml";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCfg {
    Off,
    Preferred,
    Required,
}

impl Default for ValidationCfg {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            ValidationCfg::Preferred
        } else {
            ValidationCfg::Off
        }
    }
}

impl From<ValidationCfg> for Validation {
    fn from(v: ValidationCfg) -> Self {
        match v {
            ValidationCfg::Off => Validation::Off,
            ValidationCfg::Preferred => Validation::Preferred,
            ValidationCfg::Required => Validation::Required,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "SeEngine".to_owned(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

impl WindowCfg {
    pub fn to_window_config(&self) -> WindowConfig {
        WindowConfig {
            title: self.title.clone(),
            size: RenderSize::new(self.width, self.height),
            resizable: self.resizable,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderCfg {
    #[serde(default)]
    pub validation: ValidationCfg,
    #[serde(default)]
    pub shader_dir: Option<PathBuf>,
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            validation: ValidationCfg::default(),
            shader_dir: None,
            clear_color: default_clear(),
        }
    }
}

fn default_clear() -> [f32; 4] {
    se_render_vk::DEFAULT_CLEAR
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

impl AppCfg {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads `path`. A missing file means defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let cfg =
                    Self::parse(&text).with_context(|| format!("parse {}", path.display()))?;
                info!("config loaded from {}", path.display());
                Ok(cfg)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("{} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = AppCfg::parse("").unwrap();
        assert_eq!(cfg.window.title, "SeEngine");
        assert_eq!((cfg.window.width, cfg.window.height), (800, 600));
        assert!(cfg.window.resizable);
        assert_eq!(cfg.render.validation, ValidationCfg::default());
        assert!(cfg.render.shader_dir.is_none());
        assert_eq!(cfg.render.clear_color, se_render_vk::DEFAULT_CLEAR);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg = AppCfg::parse(
            r#"
            [window]
            width = 1280
            resizable = false

            [render]
            validation = "required"
            shader_dir = "build/shaders"
            "#,
        )
        .unwrap();
        assert_eq!((cfg.window.width, cfg.window.height), (1280, 600));
        assert!(!cfg.window.resizable);
        assert_eq!(cfg.render.validation, ValidationCfg::Required);
        assert_eq!(
            cfg.render.shader_dir.as_deref(),
            Some(Path::new("build/shaders"))
        );
        assert_eq!(Validation::from(cfg.render.validation), Validation::Required);
    }

    #[test]
    fn unknown_validation_mode_is_rejected() {
        assert!(AppCfg::parse("[render]\nvalidation = \"sometimes\"").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("se-missing-{}.toml", std::process::id()));
        let cfg = AppCfg::load(&path).unwrap();
        assert_eq!(cfg.window.width, 800);
    }
}
