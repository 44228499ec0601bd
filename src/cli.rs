// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the live camera pipeline
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Running the capture and render pipeline headlessly

use livecam::app::{CameraViewController, HeadlessView};
use livecam::backends::camera::{CameraBackendType, CameraPosition, create_backend};
use livecam::config::Config;
use livecam::constants::timing::STATS_INTERVAL;
use livecam::gpu::wgpu;
use livecam::render::{RenderListener, RenderedFrame, WgpuBackend};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval, interval_at};
use tracing::{info, warn};

/// Shortest camera toggle period accepted from `--switch-every`
const MIN_SWITCH_PERIOD: Duration = Duration::from_millis(100);

/// Options of the `run` command on top of the configuration file
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub source: Option<CameraBackendType>,
    pub position: Option<CameraPosition>,
    pub no_mirror: bool,
    pub duration: Option<Duration>,
    pub switch_every: Option<Duration>,
}

/// Parse a non-negative, finite number of seconds
pub fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("'{}' is not a number of seconds: {}", value, e))?;
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| format!("'{}' must be a finite, non-negative number of seconds", value))
}

/// List all available cameras
pub fn list_cameras(source: CameraBackendType) -> Result<(), Box<dyn std::error::Error>> {
    let (discovery, _graph) = create_backend(source);
    let cameras = discovery.devices();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras ({}):", source);
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {}", index, camera.name);
        println!("      Position:    {}", camera.position);
        println!("      Orientation: {}", camera.orientation);
        println!("      Id:          {}", camera.unique_id);
        println!();
    }

    Ok(())
}

/// Presented frame as seen by the CLI
struct Presented {
    sequence: u64,
    timestamp: f64,
}

/// Forwards `did_render` into the runtime
struct PresentationForwarder {
    sender: mpsc::UnboundedSender<Presented>,
}

impl RenderListener<wgpu::Texture> for PresentationForwarder {
    fn did_render(&self, frame: &RenderedFrame<wgpu::Texture>) {
        let _ = self.sender.send(Presented {
            sequence: frame.sequence,
            timestamp: frame.timestamp,
        });
    }
}

/// Run the full pipeline into an offscreen surface until Ctrl+C or the duration ends
pub async fn run(mut config: Config, options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(source) = options.source {
        config.backend = source;
    }
    if let Some(position) = options.position {
        config.camera_position = position;
    }
    if options.no_mirror {
        config.mirror_preview = false;
    }
    config.validate()?;

    let settings = config.controller_settings();
    let view = HeadlessView::new(settings.layer.drawable_size);
    let backend = WgpuBackend::create("livecam renderer", &settings.layer).await?;
    if let Some(info) = backend.device_info() {
        println!("GPU: {} ({:?})", info.adapter_name, info.backend);
    }

    let (discovery, graph) = create_backend(config.backend);
    let controller = CameraViewController::new(discovery, graph, backend, settings)?;

    let (sender, mut receiver) = mpsc::unbounded_channel();
    let forwarder = Arc::new(PresentationForwarder { sender });
    let weak = Arc::downgrade(&forwarder);
    let listener: Weak<dyn RenderListener<wgpu::Texture>> = weak;
    controller.set_listener(Some(listener));

    controller.load_view(&view);
    controller.view_did_load()?;

    println!(
        "Running {} camera from {} (mirrored: {})",
        config.camera_position,
        config.backend,
        controller.is_mirroring_enabled()
    );
    println!("Press Ctrl+C to stop");

    let duration = options.duration;
    let deadline = async move {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut switch = options.switch_every.map(|period| {
        let period = period.max(MIN_SWITCH_PERIOD);
        interval_at(Instant::now() + period, period)
    });
    let mut report = interval(STATS_INTERVAL);
    report.tick().await;

    let mut window_frames: u64 = 0;
    let mut total_frames: u64 = 0;
    let mut last: Option<Presented> = None;
    let mut window_start = Instant::now();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Stopping...");
                break;
            }
            _ = &mut deadline => break,
            presented = receiver.recv() => {
                let Some(presented) = presented else { break };
                if let Some(previous) = &last
                    && presented.sequence <= previous.sequence
                {
                    warn!(
                        sequence = presented.sequence,
                        previous = previous.sequence,
                        "Presented frames out of order"
                    );
                }
                window_frames += 1;
                total_frames += 1;
                last = Some(presented);
            }
            _ = report.tick() => {
                let elapsed = window_start.elapsed().as_secs_f64();
                let fps = if elapsed > 0.0 { window_frames as f64 / elapsed } else { 0.0 };
                let stats = controller.renderer().stats();
                info!(
                    fps,
                    presented = total_frames,
                    draws = stats.draws,
                    dropped = stats.dropped,
                    position = %controller.session().current_position(),
                    "Presentation statistics"
                );
                println!(
                    "{:6.1} fps  presented {:>6}  dropped {:>4}  last t={:.3}s",
                    fps,
                    total_frames,
                    stats.dropped,
                    last.as_ref().map(|p| p.timestamp).unwrap_or(0.0)
                );
                window_frames = 0;
                window_start = Instant::now();
            }
            _ = async {
                match switch.as_mut() {
                    Some(switch) => {
                        switch.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => {
                println!("Switching camera");
                controller.change_camera();
            }
        }
    }

    drop(controller);
    println!("Presented {} frames", total_frames);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("2.5"), Ok(Duration::from_millis(2500)));
        assert_eq!(parse_seconds("0"), Ok(Duration::ZERO));

        for bad in ["-1", "NaN", "inf", "-inf", "soon", ""] {
            assert!(parse_seconds(bad).is_err(), "{} should be refused", bad);
        }
    }
}
