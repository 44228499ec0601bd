// SPDX-License-Identifier: GPL-3.0-only

//! Host-facing side of the pipeline: the view controller and the view seam

mod controller;
mod view;

pub use controller::{CameraViewController, ControllerSettings, RendererBridge};
pub use view::{HeadlessView, HostView};
