// SPDX-License-Identifier: GPL-3.0-only

use crate::app::ControllerSettings;
use crate::backends::camera::{
    CameraBackendType, CameraPosition, CaptureConfiguration, Framerate, PixelFormat,
};
use crate::constants::{SessionPreset, app_info, render};
use crate::errors::{AppError, AppResult};
use crate::render::{ClearColor, RendererSettings, SurfaceLayer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera opened at startup
    pub camera_position: CameraPosition,
    /// Mirror camera preview horizontally (selfie mode)
    pub mirror_preview: bool,
    /// Capture frame rate
    pub framerate: Framerate,
    /// Capture resolution preset
    pub preset: SessionPreset,
    /// Drawable width in pixels
    pub drawable_width: u32,
    /// Drawable height in pixels
    pub drawable_height: u32,
    /// Display refresh rate driving the renderer
    pub preferred_fps: u32,
    /// Color behind the video quad
    pub clear_color: ClearColor,
    /// Texture cache slots
    pub texture_cache_slots: usize,
    /// Camera backend to use (GStreamer or test pattern)
    pub backend: CameraBackendType,
    /// Log filter used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_position: CameraPosition::Front,
            mirror_preview: true, // Default to mirrored (selfie mode)
            framerate: Framerate::default(),
            preset: SessionPreset::default(),
            drawable_width: render::DRAWABLE_WIDTH,
            drawable_height: render::DRAWABLE_HEIGHT,
            preferred_fps: render::PREFERRED_FPS,
            clear_color: ClearColor::default(),
            texture_cache_slots: render::TEXTURE_CACHE_SLOTS,
            backend: CameraBackendType::default(),
            log_filter: "warn".to_string(),
        }
    }
}

impl Config {
    /// `<config dir>/livecam/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app_info::APP_NAME).join(app_info::CONFIG_FILE))
    }

    /// Load the configuration
    ///
    /// An explicit `path` must exist. Without one, the default path is read
    /// when present and defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.is_file() => path,
                _ => {
                    debug!("No config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let contents = std::fs::read_to_string(&path)?;
        let config = Self::from_json(&contents)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse and validate a JSON document; missing fields take their defaults
    pub fn from_json(contents: &str) -> AppResult<Self> {
        let config: Self =
            serde_json::from_str(contents).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.camera_position == CameraPosition::Unspecified {
            return Err(AppError::Config(
                "camera_position must be front or back".to_string(),
            ));
        }
        if self.framerate.num == 0 {
            return Err(AppError::Config("framerate must be non-zero".to_string()));
        }
        if self.drawable_width == 0 || self.drawable_height == 0 {
            return Err(AppError::Config(
                "drawable size must be non-zero".to_string(),
            ));
        }
        if self.preferred_fps == 0 {
            return Err(AppError::Config("preferred_fps must be non-zero".to_string()));
        }
        if self.texture_cache_slots == 0 {
            return Err(AppError::Config(
                "texture_cache_slots must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn surface_layer(&self) -> SurfaceLayer {
        SurfaceLayer::new(
            (self.drawable_width, self.drawable_height),
            self.clear_color,
            self.preferred_fps,
        )
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            position: self.camera_position,
            capture: CaptureConfiguration {
                framerate: self.framerate,
                preset: self.preset,
                pixel_format: PixelFormat::Bgra,
                position: self.camera_position,
            },
            renderer: RendererSettings {
                cache_slots: self.texture_cache_slots,
                clear_color: self.clear_color,
                mirrored: self.mirror_preview,
            },
            layer: self.surface_layer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json(r#"{ "camera_position": "back", "preset": "vga" }"#)
            .unwrap();
        assert_eq!(config.camera_position, CameraPosition::Back);
        assert_eq!(config.preset, SessionPreset::Vga640x480);
        assert!(config.mirror_preview);
        assert_eq!(config.texture_cache_slots, 8);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::from_json(r#"{ "texture_cache_slots": 0 }"#),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            Config::from_json(r#"{ "camera_position": "unspecified" }"#),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            Config::from_json("not json"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_controller_settings_follow_config() {
        let config = Config {
            mirror_preview: false,
            preferred_fps: 60,
            ..Default::default()
        };
        let settings = config.controller_settings();
        assert!(!settings.renderer.mirrored);
        assert_eq!(settings.layer.preferred_fps, 60);
        assert_eq!(settings.capture.pixel_format, PixelFormat::Bgra);
        assert_eq!(settings.layer.drawable_size, (1080, 1920));
    }
}
