// SPDX-License-Identifier: GPL-3.0-only

//! Capture session
//!
//! [`CameraSession`] wires a [`DeviceDiscovery`] and a [`CaptureGraph`] into
//! the frame source the view controller drives:
//!
//! - Reconfiguration happens in a [`ConfigurationTransaction`]: staged edits
//!   reach the graph only on `commit`, and a transaction dropped without
//!   committing leaves the session exactly as it was.
//! - Frames are forwarded from the graph's streaming thread to a serial queue
//!   and handed to the delegate there, one at a time, in capture order.
//! - The delegate is held weakly; once the owner drops it, frames are discarded.

use super::{
    CameraDevice, CameraPosition, CaptureConfiguration, CaptureDelegate, CaptureGraph,
    DeviceDiscovery, DeviceInput, DeviceType, FrameOutput, FrameSink, Framerate, MediaType,
    OutputSettings, RawFrame, SessionConfiguration,
};
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::constants::{SessionPreset, capture};
use crate::dispatch::{QueueHandle, SerialQueue};
use crate::errors::{BackendError, BackendResult};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace, warn};

/// Weak delegate slot shared with the frame sink
#[derive(Default)]
struct DelegateSlot {
    delegate: RwLock<Option<Weak<dyn CaptureDelegate>>>,
}

impl DelegateSlot {
    fn get(&self) -> Option<Arc<dyn CaptureDelegate>> {
        self.delegate.read().as_ref().and_then(Weak::upgrade)
    }

    fn set(&self, delegate: Option<Weak<dyn CaptureDelegate>>) {
        *self.delegate.write() = delegate;
    }
}

struct SessionState {
    graph: Box<dyn CaptureGraph>,
    committed: SessionConfiguration,
    configuration: CaptureConfiguration,
}

// Field order matters: the graph (and any sink handles it holds) must go
// before the queue joins its worker.
struct SessionInner {
    state: Mutex<SessionState>,
    discovery: Arc<dyn DeviceDiscovery>,
    delegate: Arc<DelegateSlot>,
    delivered: Arc<AtomicU64>,
    queue: SerialQueue,
}

/// Camera frame source
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct CameraSession {
    inner: Arc<SessionInner>,
}

impl CameraSession {
    /// Create a session over a backend's discovery and graph
    pub fn new(
        discovery: Arc<dyn DeviceDiscovery>,
        graph: Box<dyn CaptureGraph>,
        configuration: CaptureConfiguration,
    ) -> BackendResult<Self> {
        let queue = SerialQueue::new(capture::SESSION_QUEUE_LABEL).map_err(|e| {
            BackendError::InitializationFailed(format!("cannot spawn session queue: {}", e))
        })?;

        info!(
            backend = %graph.backend_type(),
            preset = %configuration.preset,
            framerate = %configuration.framerate,
            "Capture session created"
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(SessionState {
                    graph,
                    committed: SessionConfiguration {
                        framerate: configuration.framerate,
                        preset: configuration.preset,
                        ..Default::default()
                    },
                    configuration,
                }),
                discovery,
                delegate: Arc::new(DelegateSlot::default()),
                delivered: Arc::new(AtomicU64::new(0)),
                queue,
            }),
        })
    }

    /// Register the frame consumer; only a weak reference is kept
    pub fn set_delegate(&self, delegate: Option<Weak<dyn CaptureDelegate>>) {
        self.inner.delegate.set(delegate);
    }

    /// Device discovery the session resolves positions with
    pub fn discovery(&self) -> &Arc<dyn DeviceDiscovery> {
        &self.inner.discovery
    }

    /// Open a configuration transaction
    ///
    /// Holds the session lock until committed or dropped, so transactions on
    /// one session never interleave.
    pub fn begin_configuration(&self) -> ConfigurationTransaction<'_> {
        let state = self.inner.state.lock();
        let staged = state.committed.clone();
        debug!("Configuration transaction opened");
        ConfigurationTransaction {
            state,
            staged,
            committed: false,
        }
    }

    /// Select the camera at `position` and (re)start the session
    ///
    /// Failures are logged and leave the session on its previous camera; use
    /// [`try_configure`](Self::try_configure) to observe them.
    pub fn configure(&self, position: CameraPosition) {
        if let Err(e) = self.try_configure(position) {
            warn!(%position, error = %e, "Camera configuration failed, keeping previous input");
        }
    }

    /// Select the camera at `position` and (re)start the session
    pub fn try_configure(&self, position: CameraPosition) -> BackendResult<()> {
        let device = self.resolve_device(position)?;

        {
            let mut transaction = self.begin_configuration();
            let (framerate, preset) = {
                let configuration = transaction.configuration();
                (configuration.framerate, configuration.preset)
            };

            transaction.remove_inputs();
            let input = transaction.create_input(&device)?;
            transaction.add_input(input)?;
            transaction.set_frame_duration(framerate);
            transaction.set_preset(preset);
            transaction.commit()?;
        }

        info!(%position, device = %device.name, "Camera input configured");
        self.start();
        Ok(())
    }

    /// Attach the frame output (fixed pixel format, late frames kept)
    pub fn configure_output(&self) {
        if let Err(e) = self.try_configure_output() {
            warn!(error = %e, "Output configuration failed");
        }
    }

    /// Attach the frame output, reporting why it was refused
    pub fn try_configure_output(&self) -> BackendResult<()> {
        let pixel_format = self.capture_configuration().pixel_format;
        self.try_configure_output_with(OutputSettings::new(pixel_format))
    }

    /// Attach a frame output with explicit settings
    ///
    /// A refused output leaves the committed one in place.
    pub fn try_configure_output_with(&self, settings: OutputSettings) -> BackendResult<()> {
        let mut transaction = self.begin_configuration();
        let sink = self.frame_sink(settings);

        transaction.remove_outputs();
        transaction.add_output(FrameOutput { settings, sink })?;
        transaction.commit()?;

        debug!(format = %settings.pixel_format, "Frame output configured");
        Ok(())
    }

    /// Switch to the opposite-facing camera
    pub fn change_position(&self) {
        let next = self.current_position().opposite();
        debug!(from = %self.current_position(), to = %next, "Changing camera position");
        self.configure(next);
    }

    /// Position of the committed input, `Unspecified` if none
    pub fn current_position(&self) -> CameraPosition {
        self.inner.state.lock().committed.position()
    }

    /// The committed input device
    pub fn current_device(&self) -> Option<CameraDevice> {
        self.inner
            .state
            .lock()
            .committed
            .input
            .as_ref()
            .map(|input| input.device.clone())
    }

    /// Snapshot of the committed configuration
    pub fn committed_configuration(&self) -> SessionConfiguration {
        self.inner.state.lock().committed.clone()
    }

    pub fn capture_configuration(&self) -> CaptureConfiguration {
        self.inner.state.lock().configuration
    }

    /// Start producing frames; no-op when already running
    pub fn start(&self) {
        let mut state = self.inner.state.lock();
        if state.graph.is_running() {
            return;
        }
        match state.graph.start() {
            Ok(()) => info!("Capture session started"),
            Err(e) => error!(error = %e, "Failed to start capture session"),
        }
    }

    /// Stop producing frames; frames already queued are still delivered
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if !state.graph.is_running() {
            return;
        }
        match state.graph.stop() {
            Ok(()) => info!("Capture session stopped"),
            Err(e) => error!(error = %e, "Failed to stop capture session"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().graph.is_running()
    }

    /// Attach the output and the camera at `position` on the session queue
    ///
    /// Returns immediately. The output goes first so the input commit brings
    /// the graph up complete.
    pub fn setup_async(&self, position: CameraPosition) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.queue.dispatch(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let session = CameraSession { inner };
            session.configure_output();
            session.configure(position);
        });
    }

    /// Switch to the opposite-facing camera on the session queue
    pub fn change_position_async(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.queue.dispatch(move || {
            if let Some(inner) = weak.upgrade() {
                CameraSession { inner }.change_position();
            }
        });
    }

    /// Block until every job queued so far (setup, frame deliveries) has run
    pub fn flush(&self) {
        let _ = self.inner.queue.sync(|| ());
    }

    /// Frames handed to the delegate so far
    pub fn delivered_frames(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    fn resolve_device(&self, position: CameraPosition) -> BackendResult<CameraDevice> {
        self.inner
            .discovery
            .default_device(DeviceType::BuiltInWideAngleCamera, MediaType::Video, position)
            .ok_or_else(|| BackendError::DeviceNotFound(format!("no {} camera", position)))
    }

    fn frame_sink(&self, settings: OutputSettings) -> FrameSink {
        let delivery = FrameDelivery {
            queue: self.inner.queue.handle(),
            delegate: Arc::clone(&self.inner.delegate),
            delivered: Arc::clone(&self.inner.delivered),
            backlog: Arc::new(AtomicUsize::new(0)),
            discards_late_frames: settings.discards_late_frames,
        };
        Arc::new(move |frame: RawFrame| delivery.send(frame))
    }
}

/// Forwards frames from the graph's streaming thread to the session queue
struct FrameDelivery {
    queue: QueueHandle,
    delegate: Arc<DelegateSlot>,
    delivered: Arc<AtomicU64>,
    /// Frames dispatched that the queue has not picked up yet
    backlog: Arc<AtomicUsize>,
    discards_late_frames: bool,
}

impl FrameDelivery {
    fn send(&self, frame: RawFrame) {
        // A frame is late when the previous one is still waiting for the queue
        if self.discards_late_frames && self.backlog.load(Ordering::Acquire) > 0 {
            let presentation_time = frame.presentation_time;
            drop(frame);
            trace!(timestamp = presentation_time, "Late frame discarded");
            let delegate = Arc::clone(&self.delegate);
            self.queue.dispatch(move || {
                if let Some(delegate) = delegate.get() {
                    delegate.did_drop(presentation_time);
                }
            });
            return;
        }

        self.backlog.fetch_add(1, Ordering::AcqRel);
        let delegate = Arc::clone(&self.delegate);
        let delivered = Arc::clone(&self.delivered);
        let backlog = Arc::clone(&self.backlog);
        let queued = self.queue.dispatch(move || {
            backlog.fetch_sub(1, Ordering::AcqRel);
            deliver(&delegate, &delivered, frame);
        });
        if !queued {
            self.backlog.fetch_sub(1, Ordering::AcqRel);
            debug!(queue = self.queue.label(), "Session queue closed, frame discarded");
        }
    }
}

fn deliver(delegate: &DelegateSlot, delivered: &AtomicU64, frame: RawFrame) {
    let Some(delegate) = delegate.get() else {
        return;
    };
    let count = delivered.fetch_add(1, Ordering::Relaxed) + 1;
    if count % FRAME_LOG_INTERVAL == 0 {
        debug!(
            frame = count,
            buffer = %frame.buffer.id(),
            width = frame.buffer.width(),
            height = frame.buffer.height(),
            timestamp = frame.presentation_time,
            "Delivering frame"
        );
    }
    delegate.capture(frame);
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("position", &self.current_position())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Batched session edits applied atomically on `commit`
///
/// Dropping the transaction without committing discards every staged edit.
pub struct ConfigurationTransaction<'a> {
    state: MutexGuard<'a, SessionState>,
    staged: SessionConfiguration,
    committed: bool,
}

impl ConfigurationTransaction<'_> {
    /// Capture settings the session was created with
    pub fn configuration(&self) -> &CaptureConfiguration {
        &self.state.configuration
    }

    /// The staged configuration as it would be committed
    pub fn staged(&self) -> &SessionConfiguration {
        &self.staged
    }

    pub fn remove_inputs(&mut self) {
        self.staged.input = None;
    }

    pub fn remove_outputs(&mut self) {
        self.staged.output = None;
    }

    /// Open `device` with the session's graph
    pub fn create_input(&self, device: &CameraDevice) -> BackendResult<DeviceInput> {
        self.state.graph.create_input(device)
    }

    /// Stage an input; the session holds at most one
    pub fn add_input(&mut self, input: DeviceInput) -> BackendResult<()> {
        if self.staged.input.is_some() {
            return Err(BackendError::InputRejected(
                "session already has an input".to_string(),
            ));
        }
        if !self.state.graph.can_add_input(&input) {
            return Err(BackendError::InputRejected(input.device.name.clone()));
        }
        self.staged.input = Some(input);
        Ok(())
    }

    /// Stage an output; the session holds at most one
    pub fn add_output(&mut self, output: FrameOutput) -> BackendResult<()> {
        if self.staged.output.is_some() {
            return Err(BackendError::OutputRejected(
                "session already has an output".to_string(),
            ));
        }
        if !self.state.graph.can_add_output(&output.settings) {
            return Err(BackendError::OutputRejected(format!(
                "{} output not supported",
                output.settings.pixel_format
            )));
        }
        self.staged.output = Some(output);
        Ok(())
    }

    /// Pin min and max frame duration to one frame at `framerate`
    pub fn set_frame_duration(&mut self, framerate: Framerate) {
        self.staged.framerate = framerate;
    }

    pub fn set_preset(&mut self, preset: SessionPreset) {
        self.staged.preset = preset;
    }

    /// Apply the staged configuration to the graph
    ///
    /// On failure the committed configuration is untouched, unless the graph
    /// stopped because it could not restore its previous input; the input is
    /// then dropped from the committed configuration and the output kept, so
    /// the next `configure` rebuilds a complete graph.
    pub fn commit(mut self) -> BackendResult<()> {
        let staged = std::mem::take(&mut self.staged);
        let was_running = self.state.graph.is_running();
        if let Err(e) = self.state.graph.apply(&staged) {
            if was_running && !self.state.graph.is_running() {
                // The graph could not get back to the previous input either
                error!(error = %e, "Capture graph lost its input");
                self.state.committed.input = None;
                self.state.configuration.position = CameraPosition::Unspecified;
            }
            return Err(e);
        }

        self.state.configuration.position = staged.position();
        self.state.committed = staged;
        self.committed = true;
        debug!(
            position = %self.state.committed.position(),
            has_output = self.state.committed.output.is_some(),
            "Configuration committed"
        );
        Ok(())
    }
}

impl Drop for ConfigurationTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!("Configuration transaction rolled back");
        }
    }
}
