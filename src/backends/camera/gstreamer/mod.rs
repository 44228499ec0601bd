// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer camera backend
//!
//! Devices are found with a GStreamer device monitor (PipeWire, libcamera and
//! V4L2 device providers all report through it). Capture runs through an
//! element pipeline that converts to the session's pixel format and ends in an
//! appsink whose samples are mapped, not copied, into [`RawFrame`]s.
//!
//! [`RawFrame`]: super::RawFrame

mod discovery;
mod pipeline;

pub use discovery::GstDeviceDiscovery;
pub use pipeline::{CapturePipeline, GstCaptureGraph};

/// Make sure GStreamer is initialized; safe to call repeatedly
pub(crate) fn ensure_initialized() -> Result<(), String> {
    gstreamer::init().map_err(|e| format!("GStreamer init failed: {}", e))
}
