use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use tracing::debug;

use crate::annotation::{Color, StrokeStyle};
use crate::render::RenderOptions;

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Viewer defaults, read from `config.toml`. Missing keys fall back to the
/// values the toolbar starts with.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub initial_scale: f64,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Multiplier applied by one zoom-in step (and divided by zoom-out).
    pub zoom_step: f64,
    #[serde_as(as = "DisplayFromStr")]
    pub default_color: Color,
    pub default_width: f64,
    pub min_width: f64,
    pub max_width: f64,
    pub highlight_alpha: f32,
    pub text_size_factor: f64,
    /// Appended to the document name to form the export file name.
    pub export_suffix: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            initial_scale: 1.0,
            min_scale: 0.5,
            max_scale: 3.0,
            zoom_step: 1.2,
            default_color: Color::rgb(0xef, 0x44, 0x44),
            default_width: 3.0,
            min_width: 1.0,
            max_width: 20.0,
            highlight_alpha: 0.3,
            text_size_factor: 4.0,
            export_suffix: "_annotations.json".to_owned(),
        }
    }
}

impl ViewerConfig {
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: ViewerConfig = toml::from_str(source).context("failed to parse viewer config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml(&source).with_context(|| format!("invalid config file {:?}", path))
    }

    /// Loads `config.toml` from the platform config directory, or the
    /// defaults when the file does not exist.
    pub fn load_default() -> Result<Self> {
        let path = default_config_path()?;
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_scale > 0.0 && self.min_scale <= self.max_scale) {
            bail!(
                "scale range {}..={} is invalid",
                self.min_scale,
                self.max_scale
            );
        }
        if !(self.min_scale..=self.max_scale).contains(&self.initial_scale) {
            bail!(
                "initial scale {} is outside {}..={}",
                self.initial_scale,
                self.min_scale,
                self.max_scale
            );
        }
        if !(self.zoom_step > 1.0) {
            bail!("zoom step must be greater than 1, got {}", self.zoom_step);
        }
        if !(self.min_width > 0.0 && self.min_width <= self.max_width) {
            bail!(
                "stroke width range {}..={} is invalid",
                self.min_width,
                self.max_width
            );
        }
        if !(self.min_width..=self.max_width).contains(&self.default_width) {
            bail!("default width {} is outside the width range", self.default_width);
        }
        if !(0.0..=1.0).contains(&self.highlight_alpha) {
            bail!("highlight alpha must be within 0..=1");
        }
        if !(self.text_size_factor > 0.0) {
            bail!("text size factor must be positive");
        }
        Ok(())
    }

    /// Never panics, even on a range that [`validate`](Self::validate)
    /// would reject; the upper bound wins when the range is inverted.
    pub fn clamp_scale(&self, scale: f64) -> f64 {
        scale.max(self.min_scale).min(self.max_scale)
    }

    pub fn clamp_width(&self, width: f64) -> f64 {
        width.max(self.min_width).min(self.max_width)
    }

    pub fn default_style(&self) -> StrokeStyle {
        StrokeStyle {
            color: self.default_color,
            width: self.default_width,
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            highlight_alpha: self.highlight_alpha,
            text_size_factor: self.text_size_factor,
        }
    }
}

pub fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("net", "pdfmark", "pdfmark")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join(CONFIG_FILE_NAME))
}
