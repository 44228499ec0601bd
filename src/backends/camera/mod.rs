// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ CameraViewController│
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │    CameraSession    │  ← transactions, serial delivery queue
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐     ┌─────────────────────┐
//! │ CaptureGraph trait  │     │ DeviceDiscovery trait│
//! └──────────┬──────────┘     └──────────┬──────────┘
//!            │                           │
//!       ┌────┴──────┐               ┌────┴──────┐
//!       ▼           ▼               ▼           ▼
//!  ┌─────────┐ ┌─────────┐     ┌─────────┐ ┌─────────┐
//!  │GStreamer│ │Synthetic│     │GStreamer│ │Synthetic│
//!  └─────────┘ └─────────┘     └─────────┘ └─────────┘
//! ```

pub mod frame_loop;
pub mod gstreamer;
pub mod session;
pub mod synthetic;
pub mod types;

pub use session::{CameraSession, ConfigurationTransaction};
pub use types::*;

use crate::constants::SessionPreset;
use crate::errors::BackendResult;
use std::sync::Arc;

/// Receives captured frames, one at a time, on the session's serial queue
pub trait CaptureDelegate: Send + Sync {
    /// A frame was captured
    fn capture(&self, frame: RawFrame);

    /// A frame was discarded before delivery
    fn did_drop(&self, _presentation_time: f64) {}
}

/// Callback a graph invokes for every frame its output produces
///
/// Called on the graph's streaming thread; the session forwards to its queue.
pub type FrameSink = Arc<dyn Fn(RawFrame) + Send + Sync>;

/// A device opened as a session input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInput {
    pub device: CameraDevice,
}

/// A frame output attached to a session
#[derive(Clone)]
pub struct FrameOutput {
    pub settings: OutputSettings,
    pub sink: FrameSink,
}

impl std::fmt::Debug for FrameOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameOutput")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Inputs, outputs and timing a capture graph runs with
///
/// Staged by a [`ConfigurationTransaction`] and handed to
/// [`CaptureGraph::apply`] as a whole.
#[derive(Debug, Clone, Default)]
pub struct SessionConfiguration {
    pub input: Option<DeviceInput>,
    pub output: Option<FrameOutput>,
    /// Equal min and max frame duration pin the rate
    pub framerate: Framerate,
    pub preset: SessionPreset,
}

impl SessionConfiguration {
    /// Position of the configured input, `Unspecified` when there is none
    pub fn position(&self) -> CameraPosition {
        self.input
            .as_ref()
            .map(|input| input.device.position)
            .unwrap_or(CameraPosition::Unspecified)
    }
}

/// Enumerates capture devices and mediates camera access
pub trait DeviceDiscovery: Send + Sync {
    /// Current camera access authorization
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Ask for camera access; `completion` receives whether it was granted
    fn request_access(&self, completion: Box<dyn FnOnce(bool) + Send>);

    /// All video capture devices currently present
    fn devices(&self) -> Vec<CameraDevice>;

    /// The device of the given kind at a position, if any
    fn default_device(
        &self,
        device_type: DeviceType,
        media_type: MediaType,
        position: CameraPosition,
    ) -> Option<CameraDevice> {
        if media_type != MediaType::Video {
            return None;
        }
        self.devices()
            .into_iter()
            .find(|device| device.device_type == device_type && device.position == position)
    }
}

/// The capture graph behind a session: one input, one output, start/stop
///
/// On `Err`, `apply` leaves the graph on its previous configuration. If that
/// configuration cannot be brought back either, the graph stops and
/// `is_running` returns false.
pub trait CaptureGraph: Send {
    fn backend_type(&self) -> CameraBackendType;

    /// Open a device as an input, failing if it cannot be constructed
    fn create_input(&self, device: &CameraDevice) -> BackendResult<DeviceInput>;

    /// Whether the graph accepts this input
    fn can_add_input(&self, input: &DeviceInput) -> bool;

    /// Whether the graph accepts an output with these settings
    fn can_add_output(&self, settings: &OutputSettings) -> bool;

    /// Replace the running configuration
    fn apply(&mut self, configuration: &SessionConfiguration) -> BackendResult<()>;

    /// Begin producing frames; no-op if already running
    fn start(&mut self) -> BackendResult<()>;

    /// Stop producing frames; no-op if not running
    fn stop(&mut self) -> BackendResult<()>;

    fn is_running(&self) -> bool;
}

/// Discovery and graph for a backend type
pub fn create_backend(
    backend_type: CameraBackendType,
) -> (Arc<dyn DeviceDiscovery>, Box<dyn CaptureGraph>) {
    match backend_type {
        CameraBackendType::GStreamer => (
            Arc::new(gstreamer::GstDeviceDiscovery::new()),
            Box::new(gstreamer::GstCaptureGraph::new()),
        ),
        CameraBackendType::TestPattern => (
            Arc::new(synthetic::SyntheticDiscovery::new()),
            Box::new(synthetic::SyntheticGraph::new()),
        ),
    }
}
