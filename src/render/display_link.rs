// SPDX-License-Identifier: GPL-3.0-only

//! Display-refresh driver
//!
//! Calls [`FrameRenderer::draw`] once per refresh period on its own thread.
//! Stopping joins that thread, so no draw runs after `stop()` returns.

use super::{FrameRenderer, GpuBackend, SurfaceLayer};
use crate::backends::camera::frame_loop::{FrameLoop, LoopAction};
use crate::constants::timing::FRAME_LOG_INTERVAL;
use std::sync::Arc;
use tracing::{debug, info};

const DISPLAY_LINK_THREAD: &str = "display-link";

/// Paced draw loop bound to one renderer
pub struct DisplayLink {
    frame_loop: Option<FrameLoop>,
}

impl DisplayLink {
    /// Start drawing at the layer's preferred frame rate
    pub fn start<B: GpuBackend>(
        renderer: Arc<FrameRenderer<B>>,
        layer: &SurfaceLayer,
    ) -> std::io::Result<Self> {
        let interval = layer.frame_interval();
        info!(
            fps = layer.preferred_fps,
            interval_ms = interval.as_secs_f64() * 1000.0,
            "Starting display link"
        );

        let frame_loop = FrameLoop::start_paced(DISPLAY_LINK_THREAD, interval, move |tick| {
            let drew = renderer.draw();
            if tick % FRAME_LOG_INTERVAL == 0 {
                debug!(tick, drew, "Display refresh");
            }
            LoopAction::Continue
        })?;

        Ok(Self {
            frame_loop: Some(frame_loop),
        })
    }

    pub fn is_running(&self) -> bool {
        self.frame_loop.as_ref().is_some_and(FrameLoop::is_running)
    }

    /// Stop and join the draw thread; the renderer reference is released with it
    pub fn stop(&mut self) {
        if let Some(mut frame_loop) = self.frame_loop.take() {
            frame_loop.stop();
            info!("Display link stopped");
        }
    }
}

impl Drop for DisplayLink {
    fn drop(&mut self) {
        self.stop();
    }
}
