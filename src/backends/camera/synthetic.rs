// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic cameras
//!
//! A front and a back camera that produce BGRA gradient frames. Used when no
//! real camera is available (CI, headless demos) and by the test suite.
//!
//! Frames come from a small recycled pool, so buffer identities repeat the way
//! they do with a real driver pool. In manual mode no thread is spawned and
//! frames are pushed through a [`FrameInjector`] instead.

use super::frame_loop::{FrameLoop, LoopAction};
use super::{
    AuthorizationStatus, CameraBackendType, CameraDevice, CameraPosition, CaptureGraph,
    DeviceDiscovery, DeviceHandle, DeviceInput, DeviceType, FrameData, FrameSink, OutputSettings,
    PixelBuffer, PixelBufferId, PixelFormat, RawFrame, SessionConfiguration, VideoOrientation,
};
use crate::constants::capture::SYNTHETIC_POOL_SIZE;
use crate::errors::{BackendError, BackendResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Discovery over a fixed set of synthetic cameras
pub struct SyntheticDiscovery {
    devices: Vec<CameraDevice>,
    status: Mutex<AuthorizationStatus>,
}

impl SyntheticDiscovery {
    /// One front and one back camera, access already granted
    pub fn new() -> Self {
        Self::with_positions(&[CameraPosition::Front, CameraPosition::Back])
    }

    /// One camera per listed position
    pub fn with_positions(positions: &[CameraPosition]) -> Self {
        let devices = positions
            .iter()
            .enumerate()
            .map(|(index, position)| synthetic_device(index as u32, *position))
            .collect();
        Self {
            devices,
            status: Mutex::new(AuthorizationStatus::Authorized),
        }
    }

    /// Start from a given authorization state
    ///
    /// `NotDetermined` is granted on the first `request_access`; `Denied` and
    /// `Restricted` are never granted.
    pub fn with_authorization(mut self, status: AuthorizationStatus) -> Self {
        self.status = Mutex::new(status);
        self
    }
}

impl Default for SyntheticDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

fn synthetic_device(seed: u32, position: CameraPosition) -> CameraDevice {
    CameraDevice {
        unique_id: format!("synthetic:{}", seed),
        name: format!("Synthetic {} camera", position),
        position,
        device_type: DeviceType::BuiltInWideAngleCamera,
        orientation: VideoOrientation::Portrait,
        handle: DeviceHandle::Synthetic { seed },
    }
}

impl DeviceDiscovery for SyntheticDiscovery {
    fn authorization_status(&self) -> AuthorizationStatus {
        *self.status.lock()
    }

    fn request_access(&self, completion: Box<dyn FnOnce(bool) + Send>) {
        let granted = {
            let mut status = self.status.lock();
            if *status == AuthorizationStatus::NotDetermined {
                *status = AuthorizationStatus::Authorized;
            }
            *status == AuthorizationStatus::Authorized
        };
        debug!(granted, "Synthetic camera access requested");
        completion(granted);
    }

    fn devices(&self) -> Vec<CameraDevice> {
        self.devices.clone()
    }
}

/// Pushes frames into a manual [`SyntheticGraph`]
#[derive(Clone)]
pub struct FrameInjector {
    shared: Arc<Mutex<InjectorState>>,
}

#[derive(Default)]
struct InjectorState {
    sink: Option<FrameSink>,
    running: bool,
}

impl FrameInjector {
    /// Deliver a frame as if the camera produced it
    ///
    /// Returns `false` (and drops the frame) while the graph is stopped or has
    /// no output.
    pub fn inject(&self, frame: RawFrame) -> bool {
        let sink = {
            let state = self.shared.lock();
            if !state.running {
                return false;
            }
            state.sink.clone()
        };
        match sink {
            Some(sink) => {
                sink(frame);
                true
            }
            None => false,
        }
    }
}

/// Capture graph generating test frames
pub struct SyntheticGraph {
    active: SessionConfiguration,
    running: bool,
    frame_loop: Option<FrameLoop>,
    injector: Option<Arc<Mutex<InjectorState>>>,
    rejected: HashSet<String>,
}

impl SyntheticGraph {
    /// Graph that emits frames from its own thread at the configured rate
    pub fn new() -> Self {
        Self {
            active: SessionConfiguration::default(),
            running: false,
            frame_loop: None,
            injector: None,
            rejected: HashSet::new(),
        }
    }

    /// Graph without a frame thread, plus the handle that feeds it
    pub fn manual() -> (Self, FrameInjector) {
        let shared = Arc::new(Mutex::new(InjectorState::default()));
        let mut graph = Self::new();
        graph.injector = Some(Arc::clone(&shared));
        (graph, FrameInjector { shared })
    }

    /// Refuse inputs for the device with this id (simulates a busy camera)
    pub fn reject_device(mut self, unique_id: &str) -> Self {
        self.rejected.insert(unique_id.to_string());
        self
    }

    fn start_producing(&mut self) -> BackendResult<()> {
        if let Some(output) = &self.active.output
            && !self.can_add_output(&output.settings)
        {
            return Err(BackendError::OutputRejected(format!(
                "{} output not supported",
                output.settings.pixel_format
            )));
        }

        if let Some(shared) = &self.injector {
            let mut state = shared.lock();
            state.sink = self.active.output.as_ref().map(|output| output.sink.clone());
            state.running = true;
            return Ok(());
        }

        let (Some(input), Some(output)) = (&self.active.input, &self.active.output) else {
            debug!("Synthetic graph has no input or output, nothing to produce");
            return Ok(());
        };

        let seed = match input.device.handle {
            DeviceHandle::Synthetic { seed } => seed,
            DeviceHandle::GStreamer(_) => 0,
        };
        let (width, height) = self.active.preset.dimensions();
        let mut pattern = PatternGenerator::new(
            seed,
            width,
            height,
            output.settings.pixel_format,
            input.device.orientation,
        );
        let sink = output.sink.clone();
        let interval = self.active.framerate.frame_duration();

        let frame_loop = FrameLoop::start_paced("synthetic-camera", interval, move |_| {
            sink(pattern.next_frame());
            LoopAction::Continue
        })
        .map_err(|e| BackendError::InitializationFailed(format!("frame thread: {}", e)))?;

        info!(
            device = %input.device.name,
            width,
            height,
            framerate = %self.active.framerate,
            "Synthetic camera producing frames"
        );
        self.frame_loop = Some(frame_loop);
        Ok(())
    }

    fn stop_producing(&mut self) {
        if let Some(shared) = &self.injector {
            let mut state = shared.lock();
            state.running = false;
            state.sink = None;
        }
        if let Some(mut frame_loop) = self.frame_loop.take() {
            frame_loop.stop();
        }
    }
}

impl Default for SyntheticGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureGraph for SyntheticGraph {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::TestPattern
    }

    fn create_input(&self, device: &CameraDevice) -> BackendResult<DeviceInput> {
        match device.handle {
            DeviceHandle::Synthetic { .. } => Ok(DeviceInput {
                device: device.clone(),
            }),
            DeviceHandle::GStreamer(_) => Err(BackendError::InputRejected(format!(
                "{} is not a synthetic camera",
                device.name
            ))),
        }
    }

    fn can_add_input(&self, input: &DeviceInput) -> bool {
        !self.rejected.contains(&input.device.unique_id)
    }

    fn can_add_output(&self, settings: &OutputSettings) -> bool {
        matches!(settings.pixel_format, PixelFormat::Bgra | PixelFormat::Rgba)
    }

    fn apply(&mut self, configuration: &SessionConfiguration) -> BackendResult<()> {
        if let Some(input) = &configuration.input
            && !self.can_add_input(input)
        {
            return Err(BackendError::InputRejected(input.device.name.clone()));
        }

        let previous = std::mem::replace(&mut self.active, configuration.clone());
        if !self.running {
            return Ok(());
        }

        self.stop_producing();
        if let Err(e) = self.start_producing() {
            self.active = previous;
            if let Err(restore) = self.start_producing() {
                error!(error = %restore, "Synthetic camera could not resume previous configuration");
                self.running = false;
            }
            return Err(e);
        }
        Ok(())
    }

    fn start(&mut self) -> BackendResult<()> {
        if self.running {
            return Ok(());
        }
        self.start_producing()?;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> BackendResult<()> {
        self.stop_producing();
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

impl Drop for SyntheticGraph {
    fn drop(&mut self) {
        self.stop_producing();
    }
}

/// Moving gradient written into a recycled buffer pool
struct PatternGenerator {
    seed: u32,
    width: u32,
    height: u32,
    format: PixelFormat,
    orientation: VideoOrientation,
    frame_index: u64,
    clock: Instant,
}

impl PatternGenerator {
    fn new(
        seed: u32,
        width: u32,
        height: u32,
        format: PixelFormat,
        orientation: VideoOrientation,
    ) -> Self {
        Self {
            seed,
            width,
            height,
            format,
            orientation,
            frame_index: 0,
            clock: Instant::now(),
        }
    }

    fn next_frame(&mut self) -> RawFrame {
        let slot = self.frame_index % SYNTHETIC_POOL_SIZE as u64;
        let id = PixelBufferId(((self.seed as u64) << 32) | slot);
        let data = self.render(self.frame_index);
        self.frame_index += 1;

        RawFrame {
            buffer: PixelBuffer::packed(id, self.width, self.height, self.format, data),
            presentation_time: self.clock.elapsed().as_secs_f64(),
            orientation: self.orientation,
        }
    }

    fn render(&self, frame_index: u64) -> FrameData {
        let row_len = (self.width * 4) as usize;
        let mut data = vec![0u8; row_len * self.height as usize];
        let shift = (frame_index * 4) as u32;
        let tint = (self.seed.wrapping_mul(97) & 0xff) as u8;

        for (y, row) in data.chunks_exact_mut(row_len).enumerate() {
            let green = ((y as u32 * 255) / self.height.max(1)) as u8;
            for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
                let ramp = (((x as u32 + shift) * 255) / self.width.max(1)) as u8;
                let (b, r) = (ramp, tint);
                match self.format {
                    PixelFormat::Rgba => pixel.copy_from_slice(&[r, green, b, 0xff]),
                    _ => pixel.copy_from_slice(&[b, green, r, 0xff]),
                }
            }
        }
        FrameData::from(data)
    }
}
