//! Viewer configuration.
//!
//! Every field has a default, so an empty TOML file (or none at all) yields
//! the stock viewer: horizontal paging, 24x44 thumbnails spaced 2 apart.

use crate::{ScrollAxis, ThumbnailSize};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Thumbnails are rendered at this multiple of their slot size.
const THUMBNAIL_SCALE: f32 = 2.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub axis: ScrollAxis,
    pub thumbnails_enabled: bool,
    pub thumbnail_width: f32,
    pub thumbnail_height: f32,
    pub thumbnail_spacing: f32,
    pub thumbnail_workers: usize,
    pub poll_interval_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            axis: ScrollAxis::Horizontal,
            thumbnails_enabled: true,
            thumbnail_width: 24.0,
            thumbnail_height: 44.0,
            thumbnail_spacing: 2.0,
            thumbnail_workers: 2,
            poll_interval_ms: 50,
        }
    }
}

impl ViewerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("config: reading {}", path.display());
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!(
            "config: loaded from {} (axis={}, thumbnails={}, slot={}x{}, spacing={}, workers={})",
            path.display(),
            config.axis,
            config.thumbnails_enabled,
            config.thumbnail_width,
            config.thumbnail_height,
            config.thumbnail_spacing,
            config.thumbnail_workers,
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let dimensions = [
            ("thumbnail_width", self.thumbnail_width),
            ("thumbnail_height", self.thumbnail_height),
        ];
        for (name, value) in dimensions {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive, got {value}")));
            }
        }
        if !self.thumbnail_spacing.is_finite() || self.thumbnail_spacing < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "thumbnail_spacing must not be negative, got {}",
                self.thumbnail_spacing
            )));
        }
        Ok(())
    }

    pub fn thumbnail_size(&self) -> ThumbnailSize {
        ThumbnailSize {
            width_px: (self.thumbnail_width * THUMBNAIL_SCALE).round().max(1.0) as u32,
            height_px: (self.thumbnail_height * THUMBNAIL_SCALE).round().max(1.0) as u32,
        }
    }
}
