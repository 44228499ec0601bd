// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer capture graph
//!
//! ```text
//! device source ! videoconvert ! videoscale ! videorate ! capsfilter ! appsink
//! ```
//!
//! The capsfilter pins format, preset size and frame rate. The appsink hands
//! every sample to the output's sink, which queues it for the session without
//! blocking the streaming thread. The appsink only drops samples when the
//! output discards late frames.

use super::ensure_initialized;
use crate::backends::camera::{
    CameraBackendType, CameraDevice, CaptureGraph, DeviceHandle, DeviceInput, FrameData,
    FrameSink, OutputSettings, PixelBuffer, PixelBufferId, PixelFormat, RawFrame,
    SessionConfiguration, VideoOrientation,
};
use crate::constants::timing;
use crate::errors::{BackendError, BackendResult};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Samples the appsink queues before it blocks upstream (or drops the oldest)
const APPSINK_MAX_BUFFERS: u32 = 2;

/// One built capture pipeline for one device
pub struct CapturePipeline {
    pipeline: gstreamer::Pipeline,
    appsink: Option<AppSink>,
    device: CameraDevice,
}

impl CapturePipeline {
    /// Build (but do not start) the pipeline for `input`
    ///
    /// `origin` offsets buffer timestamps so they stay monotonic across
    /// pipeline rebuilds.
    pub fn build(
        configuration: &SessionConfiguration,
        input: &DeviceInput,
        origin: Duration,
    ) -> BackendResult<Self> {
        ensure_initialized().map_err(BackendError::NotAvailable)?;

        let device = &input.device;
        let source = source_element(device)?;

        let (width, height) = configuration.preset.dimensions();
        let pixel_format = configuration
            .output
            .as_ref()
            .map(|output| output.settings.pixel_format)
            .unwrap_or_default();
        let caps = gstreamer_video::VideoCapsBuilder::new()
            .format(gstreamer_video::VideoFormat::from_string(
                pixel_format.gst_format(),
            ))
            .width(width as i32)
            .height(height as i32)
            .framerate(gstreamer::Fraction::new(
                configuration.framerate.num as i32,
                configuration.framerate.denom as i32,
            ))
            .build();
        debug!(caps = %caps, device = %device.name, "Building capture pipeline");

        let convert = make_element("videoconvert")?;
        let scale = make_element("videoscale")?;
        let rate = make_element("videorate")?;
        let capsfilter = gstreamer::ElementFactory::make("capsfilter")
            .property("caps", &caps)
            .build()
            .map_err(|e| BackendError::InitializationFailed(format!("capsfilter: {}", e)))?;

        let (sink, appsink) = match &configuration.output {
            Some(output) => {
                let appsink = AppSink::builder()
                    .caps(&caps)
                    .max_buffers(APPSINK_MAX_BUFFERS)
                    .drop(output.settings.discards_late_frames)
                    .sync(false)
                    .enable_last_sample(false)
                    .build();
                appsink.set_callbacks(frame_callbacks(
                    output.sink.clone(),
                    device.orientation,
                    origin,
                ));
                (appsink.clone().upcast::<gstreamer::Element>(), Some(appsink))
            }
            // Without an output the device still runs, frames go nowhere
            None => (make_element("fakesink")?, None),
        };

        let pipeline = gstreamer::Pipeline::new();
        let elements = [source, convert, scale, rate, capsfilter, sink];
        pipeline.add_many(&elements).map_err(|e| {
            BackendError::InitializationFailed(format!("Failed to assemble pipeline: {}", e))
        })?;
        gstreamer::Element::link_many(&elements).map_err(|e| {
            BackendError::InitializationFailed(format!("Failed to link pipeline: {}", e))
        })?;

        Ok(Self {
            pipeline,
            appsink,
            device: device.clone(),
        })
    }

    pub fn device(&self) -> &CameraDevice {
        &self.device
    }

    /// Bring the pipeline to PLAYING, waiting for the state change
    pub fn play(&self) -> BackendResult<()> {
        debug!(device = %self.device.name, "Setting pipeline to PLAYING state");
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Playing) {
            let reason = self.bus_error().unwrap_or_else(|| e.to_string());
            let _ = self.pipeline.set_state(gstreamer::State::Null);
            return Err(BackendError::Pipeline(reason));
        }

        let (result, state, pending) = self.pipeline.state(gstreamer::ClockTime::from_seconds(
            timing::START_TIMEOUT_SECS,
        ));
        debug!(result = ?result, state = ?state, pending = ?pending, "Pipeline state");
        if let Err(e) = result {
            let reason = self.bus_error().unwrap_or_else(|| e.to_string());
            let _ = self.pipeline.set_state(gstreamer::State::Null);
            return Err(BackendError::Pipeline(reason));
        }
        if state != gstreamer::State::Playing {
            warn!("Pipeline is not in PLAYING state");
        }

        info!(device = %self.device.name, "Capture pipeline playing");
        Ok(())
    }

    /// Bring the pipeline to NULL, releasing the device
    pub fn halt(&self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            error!(error = %e, "Failed to stop pipeline");
            return;
        }
        let (result, state, _) = self.pipeline.state(gstreamer::ClockTime::from_seconds(
            timing::STOP_TIMEOUT_SECS,
        ));
        match result {
            Ok(_) => info!(state = ?state, device = %self.device.name, "Capture pipeline stopped"),
            Err(e) => debug!(error = ?e, state = ?state, "Pipeline state change had issues"),
        }
    }

    fn bus_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let message = bus.pop_filtered(&[gstreamer::MessageType::Error])?;
        match message.view() {
            gstreamer::MessageView::Error(err) => Some(match err.debug() {
                Some(debug) => format!("{} ({})", err.error(), debug),
                None => err.error().to_string(),
            }),
            _ => None,
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        debug!(device = %self.device.name, "Dropping capture pipeline");
        // Release the frame sink before the device
        if let Some(appsink) = &self.appsink {
            appsink.set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
        }
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

fn source_element(device: &CameraDevice) -> BackendResult<gstreamer::Element> {
    match &device.handle {
        DeviceHandle::GStreamer(gst_device) => gst_device
            .create_element(None)
            .map_err(|e| BackendError::InputRejected(format!("{}: {}", device.name, e))),
        DeviceHandle::Synthetic { .. } => Err(BackendError::InputRejected(format!(
            "{} is not a GStreamer device",
            device.name
        ))),
    }
}

fn make_element(factory: &str) -> BackendResult<gstreamer::Element> {
    gstreamer::ElementFactory::make(factory)
        .build()
        .map_err(|e| BackendError::InitializationFailed(format!("{}: {}", factory, e)))
}

fn frame_callbacks(
    sink: FrameSink,
    orientation: VideoOrientation,
    origin: Duration,
) -> gstreamer_app::AppSinkCallbacks {
    let frame_counter = AtomicU64::new(0);
    let wall_clock = Instant::now();

    gstreamer_app::AppSinkCallbacks::builder()
        .new_sample(move |appsink| {
            let frame_num = frame_counter.fetch_add(1, Ordering::Relaxed);
            let log_this_frame = frame_num % timing::FRAME_LOG_INTERVAL == 0;

            let sample = appsink.pull_sample().map_err(|e| {
                if log_this_frame {
                    error!(frame = frame_num, error = ?e, "Failed to pull sample");
                }
                gstreamer::FlowError::Eos
            })?;

            let caps = sample.caps().ok_or_else(|| {
                if log_this_frame {
                    error!(frame = frame_num, "No caps in sample");
                }
                gstreamer::FlowError::Error
            })?;
            let video_info = VideoInfo::from_caps(caps).map_err(|e| {
                if log_this_frame {
                    error!(frame = frame_num, error = ?e, "Failed to get video info");
                }
                gstreamer::FlowError::Error
            })?;
            let Some(pixel_format) = PixelFormat::from_gst_format(video_info.format()) else {
                error!(format = ?video_info.format(), "Negotiated an unexpected pixel format");
                return Err(gstreamer::FlowError::NotNegotiated);
            };

            let buffer = sample.buffer_owned().ok_or_else(|| {
                if log_this_frame {
                    error!(frame = frame_num, "No buffer in sample");
                }
                gstreamer::FlowError::Error
            })?;
            let elapsed = match buffer.pts() {
                Some(pts) => Duration::from_nanos(pts.nseconds()),
                None => wall_clock.elapsed(),
            };
            let presentation_time = (origin + elapsed).as_secs_f64();

            // Keep the sample memory mapped; the renderer reads it in place
            let mapped = buffer.into_mapped_buffer_readable().map_err(|_| {
                if log_this_frame {
                    error!(frame = frame_num, "Failed to map buffer");
                }
                gstreamer::FlowError::Error
            })?;
            let data = FrameData::from_mapped_buffer(mapped);
            let id = PixelBufferId(data.base_address() as u64);

            let pixel_buffer = PixelBuffer::new(
                id,
                video_info.width(),
                video_info.height(),
                video_info.stride()[0] as u32,
                pixel_format,
                data,
            );

            if log_this_frame {
                debug!(
                    frame = frame_num,
                    buffer = %id,
                    width = video_info.width(),
                    height = video_info.height(),
                    stride = video_info.stride()[0],
                    timestamp = presentation_time,
                    "Frame captured"
                );
            }

            sink(RawFrame {
                buffer: pixel_buffer,
                presentation_time,
                orientation,
            });
            Ok(gstreamer::FlowSuccess::Ok)
        })
        .build()
}

/// Capture graph backed by one GStreamer pipeline at a time
pub struct GstCaptureGraph {
    active: Option<CapturePipeline>,
    running: bool,
    clock: Instant,
}

impl GstCaptureGraph {
    pub fn new() -> Self {
        Self {
            active: None,
            running: false,
            clock: Instant::now(),
        }
    }

    /// Bring the previous pipeline back after its replacement failed to play
    ///
    /// When that fails too the graph has no live pipeline left and reports
    /// itself stopped.
    fn restore(&mut self, cause: BackendError) -> BackendError {
        let Some(old) = &self.active else {
            return cause;
        };
        match old.play() {
            Ok(()) => {
                info!(device = %old.device().name, "Previous pipeline restored");
                cause
            }
            Err(restore) => {
                error!(error = %restore, "Failed to restore previous pipeline");
                self.active = None;
                self.running = false;
                BackendError::Pipeline(format!(
                    "{}; previous pipeline not restored: {}",
                    cause, restore
                ))
            }
        }
    }
}

/// Order in which a running graph swaps pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handover {
    /// Halt the old pipeline before playing the new one
    ReleaseFirst,
    /// Play the new pipeline, then halt the old one
    StartFirst,
}

fn handover(old: Option<&CameraDevice>, new: Option<&CameraDevice>) -> Handover {
    match (old, new) {
        (Some(old), Some(new)) if old.unique_id == new.unique_id => Handover::ReleaseFirst,
        _ => Handover::StartFirst,
    }
}

impl Default for GstCaptureGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureGraph for GstCaptureGraph {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::GStreamer
    }

    fn create_input(&self, device: &CameraDevice) -> BackendResult<DeviceInput> {
        ensure_initialized().map_err(BackendError::NotAvailable)?;
        // Constructing the source proves the device provider can open it
        source_element(device)?;
        Ok(DeviceInput {
            device: device.clone(),
        })
    }

    fn can_add_input(&self, input: &DeviceInput) -> bool {
        matches!(input.device.handle, DeviceHandle::GStreamer(_))
    }

    fn can_add_output(&self, settings: &OutputSettings) -> bool {
        ensure_initialized().is_ok()
            && gstreamer::ElementFactory::find("appsink").is_some()
            && gstreamer_video::VideoFormat::from_string(settings.pixel_format.gst_format())
                != gstreamer_video::VideoFormat::Unknown
    }

    fn apply(&mut self, configuration: &SessionConfiguration) -> BackendResult<()> {
        // Build first: a construction failure must leave the running pipeline alone
        let next = match &configuration.input {
            Some(input) => Some(CapturePipeline::build(
                configuration,
                input,
                self.clock.elapsed(),
            )?),
            None => None,
        };

        if !self.running {
            self.active = next;
            return Ok(());
        }

        match handover(
            self.active.as_ref().map(CapturePipeline::device),
            next.as_ref().map(CapturePipeline::device),
        ) {
            Handover::ReleaseFirst => {
                // One device cannot feed two pipelines
                if let Some(old) = &self.active {
                    old.halt();
                }
                if let Some(new) = &next
                    && let Err(e) = new.play()
                {
                    return Err(self.restore(e));
                }
            }
            Handover::StartFirst => {
                if let Some(new) = &next {
                    new.play()?;
                }
                if let Some(old) = &self.active {
                    old.halt();
                }
            }
        }

        self.active = next;
        Ok(())
    }

    fn start(&mut self) -> BackendResult<()> {
        if self.running {
            return Ok(());
        }
        if let Some(pipeline) = &self.active {
            pipeline.play()?;
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> BackendResult<()> {
        if !self.running {
            return Ok(());
        }
        if let Some(pipeline) = &self.active {
            pipeline.halt();
        }
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
