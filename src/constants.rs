// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capture resolution presets
///
/// The preset is applied when a configuration transaction commits. Devices that
/// cannot produce the exact size are scaled to it by the capture pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionPreset {
    /// 640x480
    #[serde(rename = "vga")]
    Vga640x480,
    /// 1280x720
    #[serde(rename = "720p")]
    Hd1280x720,
    /// 1920x1080 (default)
    #[default]
    #[serde(rename = "1080p")]
    Hd1920x1080,
    /// 3840x2160
    #[serde(rename = "4k")]
    Hd4K3840x2160,
}

impl SessionPreset {
    /// All presets, smallest first
    pub const ALL: [SessionPreset; 4] = [
        SessionPreset::Vga640x480,
        SessionPreset::Hd1280x720,
        SessionPreset::Hd1920x1080,
        SessionPreset::Hd4K3840x2160,
    ];

    /// Display name for the preset
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionPreset::Vga640x480 => "VGA",
            SessionPreset::Hd1280x720 => "720p",
            SessionPreset::Hd1920x1080 => "1080p",
            SessionPreset::Hd4K3840x2160 => "4K",
        }
    }

    /// Frame dimensions (width, height) in landscape sensor orientation
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            SessionPreset::Vga640x480 => (640, 480),
            SessionPreset::Hd1280x720 => (1280, 720),
            SessionPreset::Hd1920x1080 => (1920, 1080),
            SessionPreset::Hd4K3840x2160 => (3840, 2160),
        }
    }
}

impl std::fmt::Display for SessionPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (width, height) = self.dimensions();
        write!(f, "{}x{}", width, height)
    }
}

/// Capture session constants
pub mod capture {
    /// Target frame rate numerator (frames)
    pub const FRAMERATE_NUM: u32 = 30;

    /// Target frame rate denominator (seconds)
    pub const FRAMERATE_DENOM: u32 = 1;

    /// Label of the serial queue that runs configuration and frame delivery
    pub const SESSION_QUEUE_LABEL: &str = "camera.session.queue";

    /// Pixel buffers recycled by the synthetic camera (mirrors a small driver pool)
    pub const SYNTHETIC_POOL_SIZE: usize = 4;
}

/// Renderer and drawable surface constants
pub mod render {
    /// Drawable width in pixels (portrait)
    pub const DRAWABLE_WIDTH: u32 = 1080;

    /// Drawable height in pixels (portrait)
    pub const DRAWABLE_HEIGHT: u32 = 1920;

    /// Display refresh rate driving `draw()`
    pub const PREFERRED_FPS: u32 = 30;

    /// Drawables in flight at once (like a triple-buffered swapchain)
    pub const DRAWABLE_COUNT: usize = 3;

    /// Texture cache slots; frames are dropped when all are referenced by pending draws
    pub const TEXTURE_CACHE_SLOTS: usize = 8;

    /// Vertices of the full-screen quad (triangle strip)
    pub const QUAD_VERTEX_COUNT: u32 = 4;

    /// Vertex stage entry point
    pub const VERTEX_ENTRY_POINT: &str = "vertex_default_video_shader";

    /// Fragment stage entry point
    pub const FRAGMENT_ENTRY_POINT: &str = "fragment_default_video_shader";
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Frame logging interval (log every N frames)
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Pipeline stop timeout in seconds
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// Pipeline start timeout in seconds
    pub const START_TIMEOUT_SECS: u64 = 5;

    /// Interval between presentation statistics reports in the CLI
    pub const STATS_INTERVAL: Duration = Duration::from_secs(1);
}

/// Application metadata
pub mod app_info {
    /// Application name used for the config directory
    pub const APP_NAME: &str = "livecam";

    /// Config file name inside the config directory
    pub const CONFIG_FILE: &str = "config.json";

    /// Version string from the build script
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
