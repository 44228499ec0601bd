// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use crate::constants::{SessionPreset, capture};
use gstreamer::buffer::{MappedBuffer, Readable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Frame data storage - either pre-copied bytes or zero-copy GStreamer buffer
///
/// The `Mapped` variant keeps the GStreamer buffer mapped and alive until all
/// references are dropped, so handing a frame to the renderer never copies pixels.
#[derive(Clone)]
pub enum FrameData {
    /// Owned bytes (synthetic frames, tests)
    Copied(Arc<[u8]>),
    /// Zero-copy mapped GStreamer buffer
    Mapped(Arc<MappedBuffer<Readable>>),
}

impl FrameData {
    /// Create FrameData from a mapped GStreamer buffer (zero-copy)
    pub fn from_mapped_buffer(buffer: MappedBuffer<Readable>) -> Self {
        FrameData::Mapped(Arc::new(buffer))
    }

    /// Address of the first byte, used as the identity of pooled memory
    pub fn base_address(&self) -> usize {
        self.as_ref().as_ptr() as usize
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Copied(data) => write!(f, "FrameData::Copied({} bytes)", data.len()),
            FrameData::Mapped(buf) => write!(f, "FrameData::Mapped({} bytes)", buf.len()),
        }
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FrameData::Copied(data) => data.as_ref(),
            FrameData::Mapped(buf) => buf.as_slice(),
        }
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_ref()
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(data: Vec<u8>) -> Self {
        FrameData::Copied(Arc::from(data))
    }
}

/// Camera backend type
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum CameraBackendType {
    /// GStreamer device discovery and capture
    #[default]
    #[serde(rename = "gstreamer")]
    #[value(name = "gstreamer")]
    GStreamer,
    /// Synthetic front/back cameras producing test frames
    TestPattern,
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::GStreamer => write!(f, "GStreamer"),
            CameraBackendType::TestPattern => write!(f, "test pattern"),
        }
    }
}

/// Which way a camera faces
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum CameraPosition {
    /// Facing the user
    #[default]
    Front,
    /// Facing away from the user
    Back,
    /// No position reported (external cameras)
    #[value(skip)]
    Unspecified,
}

impl CameraPosition {
    /// Position a camera switch moves to; anything but front switches to back
    pub fn opposite(&self) -> Self {
        match self {
            CameraPosition::Front => CameraPosition::Back,
            CameraPosition::Back | CameraPosition::Unspecified => CameraPosition::Front,
        }
    }

    /// Parse a device location property ("front", "back", "external")
    pub fn from_location(location: &str) -> Self {
        match location.trim().to_ascii_lowercase().as_str() {
            "front" | "user" => CameraPosition::Front,
            "back" | "rear" | "environment" => CameraPosition::Back,
            _ => CameraPosition::Unspecified,
        }
    }
}

impl std::fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraPosition::Front => write!(f, "front"),
            CameraPosition::Back => write!(f, "back"),
            CameraPosition::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Orientation of the frame content as delivered by the capture connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VideoOrientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl VideoOrientation {
    /// Map a clockwise sensor mounting rotation to the orientation of delivered frames
    pub fn from_sensor_rotation(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => VideoOrientation::LandscapeRight,
            180 => VideoOrientation::PortraitUpsideDown,
            270 => VideoOrientation::LandscapeLeft,
            _ => VideoOrientation::Portrait,
        }
    }
}

impl std::fmt::Display for VideoOrientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoOrientation::Portrait => write!(f, "portrait"),
            VideoOrientation::PortraitUpsideDown => write!(f, "portraitUpsideDown"),
            VideoOrientation::LandscapeLeft => write!(f, "landscapeLeft"),
            VideoOrientation::LandscapeRight => write!(f, "landscapeRight"),
        }
    }
}

/// Kind of capture device requested from discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// The general-purpose camera of a given position
    BuiltInWideAngleCamera,
}

/// Media carried by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Video,
    Audio,
}

/// Camera access authorization state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    NotDetermined,
    Restricted,
}

/// Backend-specific handle used to open a device
#[derive(Debug, Clone)]
pub enum DeviceHandle {
    /// Device discovered by a GStreamer device monitor
    GStreamer(gstreamer::Device),
    /// Synthetic camera; the seed varies the generated pattern
    Synthetic { seed: u32 },
}

/// Represents a camera device
#[derive(Debug, Clone)]
pub struct CameraDevice {
    /// Stable identifier within one discovery session
    pub unique_id: String,
    pub name: String,
    pub position: CameraPosition,
    pub device_type: DeviceType,
    /// Orientation of frames delivered by this device
    pub orientation: VideoOrientation,
    pub handle: DeviceHandle,
}

impl PartialEq for CameraDevice {
    fn eq(&self, other: &Self) -> bool {
        self.unique_id == other.unique_id
    }
}

impl Eq for CameraDevice {}

/// Framerate as a fraction (numerator/denominator)
/// Stores exact framerate to handle NTSC rates like 59.94fps (60000/1001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    /// Create a new framerate from numerator and denominator
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    /// Create a framerate from an integer (e.g., 30 becomes 30/1)
    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    /// Get the framerate as a floating point value
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    /// Duration of one frame, used as both min and max frame duration bound
    pub fn frame_duration(&self) -> std::time::Duration {
        if self.num == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.denom as f64 / self.num as f64)
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.denom != 1 {
            write!(f, "{:.2}", self.as_f64())
        } else {
            write!(f, "{}", self.num)
        }
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self::new(capture::FRAMERATE_NUM, capture::FRAMERATE_DENOM)
    }
}

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 32-bit B G R A, the capture output format
    #[default]
    Bgra,
    /// 32-bit R G B A
    Rgba,
    /// Semi-planar 4:2:0; not sampleable as a single texture
    Nv12,
}

impl PixelFormat {
    /// Bytes per pixel of the first plane
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Bgra | PixelFormat::Rgba => 4,
            PixelFormat::Nv12 => 1,
        }
    }

    /// GStreamer video format name
    pub fn gst_format(&self) -> &'static str {
        match self {
            PixelFormat::Bgra => "BGRA",
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Nv12 => "NV12",
        }
    }

    /// Map a GStreamer video format back to a pixel format
    pub fn from_gst_format(format: gstreamer_video::VideoFormat) -> Option<Self> {
        match format {
            gstreamer_video::VideoFormat::Bgra => Some(PixelFormat::Bgra),
            gstreamer_video::VideoFormat::Rgba => Some(PixelFormat::Rgba),
            gstreamer_video::VideoFormat::Nv12 => Some(PixelFormat::Nv12),
            _ => None,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.gst_format())
    }
}

/// Identity of the memory backing a pixel buffer
///
/// Capture pools recycle their buffers, so the same identity shows up again
/// with new contents; the texture cache keys its slots on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PixelBufferId(pub u64);

impl std::fmt::Display for PixelBufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:x}", self.0)
    }
}

/// Host-accessible image memory of one captured frame
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    id: PixelBufferId,
    width: u32,
    height: u32,
    /// Row stride in bytes (may include padding)
    stride: u32,
    format: PixelFormat,
    data: FrameData,
}

impl PixelBuffer {
    /// Wrap frame memory; `stride` is bytes per row
    pub fn new(
        id: PixelBufferId,
        width: u32,
        height: u32,
        stride: u32,
        format: PixelFormat,
        data: FrameData,
    ) -> Self {
        Self {
            id,
            width,
            height,
            stride,
            format,
            data,
        }
    }

    /// Tightly packed buffer (stride = width * bytes per pixel)
    pub fn packed(
        id: PixelBufferId,
        width: u32,
        height: u32,
        format: PixelFormat,
        data: FrameData,
    ) -> Self {
        let stride = width * format.bytes_per_pixel();
        Self::new(id, width, height, stride, format, data)
    }

    pub fn id(&self) -> PixelBufferId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes needed for `height` rows at the buffer's stride
    pub fn required_len(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        let row = (self.width * self.format.bytes_per_pixel()) as usize;
        self.stride as usize * (self.height as usize - 1) + row
    }

    /// Whether stride and data length cover every row
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.stride >= self.width * self.format.bytes_per_pixel()
            && self.data.len() >= self.required_len()
    }
}

/// One captured frame handed from the capture queue to the renderer
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub buffer: PixelBuffer,
    /// Presentation timestamp in monotonic seconds
    pub presentation_time: f64,
    pub orientation: VideoOrientation,
}

/// Capture settings of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfiguration {
    pub framerate: Framerate,
    pub preset: SessionPreset,
    pub pixel_format: PixelFormat,
    pub position: CameraPosition,
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            framerate: Framerate::default(),
            preset: SessionPreset::default(),
            pixel_format: PixelFormat::Bgra,
            position: CameraPosition::Front,
        }
    }
}

/// Settings of the frame output attached to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSettings {
    pub pixel_format: PixelFormat,
    /// Drop a frame instead of queueing it behind one not yet delivered
    pub discards_late_frames: bool,
}

impl OutputSettings {
    /// Fixed-format output that never discards late frames
    pub fn new(pixel_format: PixelFormat) -> Self {
        Self {
            pixel_format,
            discards_late_frames: false,
        }
    }
}
