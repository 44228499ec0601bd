// SPDX-License-Identifier: MPL-2.0

//! livecam - live camera frames rendered through a GPU shader pipeline
//!
//! This library captures frames from a camera on a serial worker queue,
//! converts each one into a GPU texture and draws it from a display-refresh
//! thread, reporting every presented frame to a listener.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`app`]: View controller wiring capture to rendering
//! - [`backends`]: Camera backend abstraction (GStreamer, synthetic)
//! - [`render`]: Frame renderer, texture cache and wgpu backend
//! - [`gpu`]: wgpu device creation
//! - [`shaders`]: WGSL sources
//! - [`config`]: User configuration handling
//! - [`dispatch`]: Serial worker queues
//!
//! # Example
//!
//! ```ignore
//! let layer = SurfaceLayer::default();
//! let backend = WgpuBackend::create("livecam", &layer).await?;
//! let (discovery, graph) = create_backend(CameraBackendType::GStreamer);
//! let controller = CameraViewController::new(discovery, graph, backend, settings)?;
//! controller.load_view(&view);
//! controller.view_did_load()?;
//! ```

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod errors;
pub mod gpu;
pub mod render;
pub mod shaders;

// Re-export commonly used types
pub use app::{CameraViewController, ControllerSettings, HostView};
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use render::{FrameRenderer, RenderListener, RenderedFrame};
