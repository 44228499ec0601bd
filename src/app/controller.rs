// SPDX-License-Identifier: GPL-3.0-only

//! Camera view controller
//!
//! Composition root of the pipeline. It owns the capture session, the frame
//! renderer and the display link, connects them through a [`RendererBridge`]
//! and forwards presented frames to the host. It holds no pipeline logic.

use super::view::HostView;
use crate::backends::camera::{
    AuthorizationStatus, CameraPosition, CameraSession, CaptureConfiguration, CaptureDelegate,
    CaptureGraph, DeviceDiscovery, RawFrame,
};
use crate::errors::AppResult;
use crate::render::{
    DisplayLink, FrameRenderer, GpuBackend, RenderListener, RenderedFrame, RendererSettings,
    SurfaceLayer,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Everything the controller is built from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerSettings {
    /// Camera opened once the view has loaded
    pub position: CameraPosition,
    pub capture: CaptureConfiguration,
    pub renderer: RendererSettings,
    pub layer: SurfaceLayer,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            position: CameraPosition::Front,
            capture: CaptureConfiguration::default(),
            renderer: RendererSettings {
                mirrored: true,
                ..Default::default()
            },
            layer: SurfaceLayer::default(),
        }
    }
}

/// Adapts session delivery into renderer input and renderer output into host
/// notifications
pub struct RendererBridge<B: GpuBackend> {
    renderer: Arc<FrameRenderer<B>>,
    host: RwLock<Option<Weak<dyn RenderListener<B::Texture>>>>,
    presented: AtomicU64,
}

impl<B: GpuBackend> RendererBridge<B> {
    fn new(renderer: Arc<FrameRenderer<B>>) -> Self {
        Self {
            renderer,
            host: RwLock::new(None),
            presented: AtomicU64::new(0),
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::Relaxed)
    }
}

impl<B: GpuBackend> CaptureDelegate for RendererBridge<B> {
    fn capture(&self, frame: RawFrame) {
        // Orientation travels with the frame; the renderer does not rotate yet
        self.renderer.render(frame);
    }

    fn did_drop(&self, presentation_time: f64) {
        debug!(timestamp = presentation_time, "Capture dropped a frame");
    }
}

impl<B: GpuBackend> RenderListener<B::Texture> for RendererBridge<B> {
    fn did_render(&self, frame: &RenderedFrame<B::Texture>) {
        self.presented.fetch_add(1, Ordering::Relaxed);
        let host = self.host.read().as_ref().and_then(Weak::upgrade);
        if let Some(host) = host {
            host.did_render(frame);
        }
    }
}

/// Hosts the camera preview: capture session in, rendered frames out
pub struct CameraViewController<B: GpuBackend> {
    display_link: Mutex<Option<DisplayLink>>,
    session: CameraSession,
    bridge: Arc<RendererBridge<B>>,
    renderer: Arc<FrameRenderer<B>>,
    settings: ControllerSettings,
}

impl<B: GpuBackend> CameraViewController<B> {
    /// Build the session and renderer; nothing runs until `view_did_load`
    pub fn new(
        discovery: Arc<dyn DeviceDiscovery>,
        graph: Box<dyn CaptureGraph>,
        backend: B,
        settings: ControllerSettings,
    ) -> AppResult<Self> {
        let renderer = Arc::new(FrameRenderer::new(backend, settings.renderer)?);
        let session = CameraSession::new(discovery, graph, settings.capture)?;

        let bridge = Arc::new(RendererBridge::new(Arc::clone(&renderer)));
        let weak = Arc::downgrade(&bridge);
        let delegate: Weak<dyn CaptureDelegate> = weak.clone();
        let listener: Weak<dyn RenderListener<B::Texture>> = weak;
        session.set_delegate(Some(delegate));
        renderer.set_listener(Some(listener));

        info!(
            position = %settings.position,
            mirrored = settings.renderer.mirrored,
            "Camera view controller created"
        );

        Ok(Self {
            display_link: Mutex::new(None),
            session,
            bridge,
            renderer,
            settings,
        })
    }

    /// Put the renderer's surface at the bottom of the host view
    pub fn load_view(&self, view: &dyn HostView) {
        let (width, height) = view.bounds();
        view.insert_layer(self.settings.layer, 0);
        debug!(
            view_width = width,
            view_height = height,
            drawable_width = self.settings.layer.drawable_size.0,
            drawable_height = self.settings.layer.drawable_size.1,
            "Surface layer inserted"
        );
    }

    /// Start drawing and bring the camera up once access is granted
    ///
    /// Returns without waiting for the camera; setup runs on the session queue.
    pub fn view_did_load(&self) -> AppResult<()> {
        {
            let mut display_link = self.display_link.lock();
            if display_link.is_none() {
                *display_link = Some(DisplayLink::start(
                    Arc::clone(&self.renderer),
                    &self.settings.layer,
                )?);
            }
        }

        let discovery = self.session.discovery();
        let position = self.settings.position;
        match discovery.authorization_status() {
            AuthorizationStatus::Authorized => self.session.setup_async(position),
            AuthorizationStatus::NotDetermined => {
                let session = self.session.clone();
                discovery.request_access(Box::new(move |granted| {
                    if granted {
                        session.setup_async(position);
                    } else {
                        warn!("Camera access denied, camera not started");
                    }
                }));
            }
            status => warn!(?status, "Camera access unavailable, camera not started"),
        }
        Ok(())
    }

    /// Switch between front and back camera without blocking the caller
    pub fn change_camera(&self) {
        self.session.change_position_async();
    }

    pub fn set_mirroring_enabled(&self, enabled: bool) {
        self.renderer.set_mirroring_enabled(enabled);
    }

    pub fn is_mirroring_enabled(&self) -> bool {
        self.renderer.is_mirroring_enabled()
    }

    /// Register the host's presented-frame listener; only a weak reference is kept
    pub fn set_listener(&self, listener: Option<Weak<dyn RenderListener<B::Texture>>>) {
        *self.bridge.host.write() = listener;
    }

    /// Frames presented since creation
    pub fn presented_frames(&self) -> u64 {
        self.bridge.presented()
    }

    pub fn session(&self) -> &CameraSession {
        &self.session
    }

    pub fn renderer(&self) -> &Arc<FrameRenderer<B>> {
        &self.renderer
    }

    pub fn layer(&self) -> &SurfaceLayer {
        &self.settings.layer
    }

    pub fn is_displaying(&self) -> bool {
        self.display_link
            .lock()
            .as_ref()
            .is_some_and(DisplayLink::is_running)
    }
}

impl<B: GpuBackend> Drop for CameraViewController<B> {
    fn drop(&mut self) {
        // No draw may run once the renderer starts going away
        if let Some(mut display_link) = self.display_link.lock().take() {
            display_link.stop();
        }
        self.session.stop();
        self.session.set_delegate(None);
        self.session.flush();
        info!(
            presented = self.bridge.presented(),
            delivered = self.session.delivered_frames(),
            "Camera view controller released"
        );
    }
}
