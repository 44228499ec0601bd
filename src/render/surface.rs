// SPDX-License-Identifier: GPL-3.0-only

//! Drawable surface description
//!
//! The layer a host view embeds: how big the drawables are, what they are
//! cleared to, their pixel format and how often the display link draws.

use crate::constants::render::{DRAWABLE_HEIGHT, DRAWABLE_WIDTH, PREFERRED_FPS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// RGBA clear color, components in 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClearColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl ClearColor {
    pub const BLACK: ClearColor = ClearColor {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };

    pub fn to_array(&self) -> [f64; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for ClearColor {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Pixel format of the drawables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SurfaceFormat {
    #[default]
    Bgra8Unorm,
}

impl SurfaceFormat {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            SurfaceFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        }
    }
}

/// The renderer's drawing surface, inserted into the host view's layer stack
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceLayer {
    /// Drawable size in pixels
    pub drawable_size: (u32, u32),
    pub pixel_format: SurfaceFormat,
    pub clear_color: ClearColor,
    /// Display refresh rate driving `draw()`
    pub preferred_fps: u32,
    /// When false, presented drawables can be copied or sampled by the listener
    pub framebuffer_only: bool,
}

impl SurfaceLayer {
    pub fn new(drawable_size: (u32, u32), clear_color: ClearColor, preferred_fps: u32) -> Self {
        Self {
            drawable_size,
            pixel_format: SurfaceFormat::Bgra8Unorm,
            clear_color,
            preferred_fps: preferred_fps.max(1),
            framebuffer_only: false,
        }
    }

    /// Time between two display refreshes
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.preferred_fps.max(1)))
    }
}

impl Default for SurfaceLayer {
    fn default() -> Self {
        Self::new(
            (DRAWABLE_WIDTH, DRAWABLE_HEIGHT),
            ClearColor::default(),
            PREFERRED_FPS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layer() {
        let layer = SurfaceLayer::default();
        assert_eq!(layer.drawable_size, (1080, 1920));
        assert_eq!(layer.pixel_format, SurfaceFormat::Bgra8Unorm);
        assert_eq!(layer.clear_color.to_array(), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(layer.preferred_fps, 30);
        assert!(!layer.framebuffer_only);
    }

    #[test]
    fn test_zero_fps_is_clamped() {
        let layer = SurfaceLayer::new((4, 4), ClearColor::BLACK, 0);
        assert_eq!(layer.preferred_fps, 1);
        assert_eq!(layer.frame_interval(), Duration::from_secs(1));
    }
}
