// SPDX-License-Identifier: GPL-3.0-only

//! Host view seam
//!
//! The controller does not own a window. It is handed a [`HostView`] that
//! reports its bounds and accepts layers; the renderer's surface goes in at
//! index 0, below anything the host draws on top.

use crate::render::SurfaceLayer;
use parking_lot::Mutex;

/// The view hierarchy the controller's surface is inserted into
pub trait HostView: Send + Sync {
    /// Size of the view in pixels
    fn bounds(&self) -> (u32, u32);

    /// Insert `layer` at `index` of the layer stack (0 is bottommost)
    fn insert_layer(&self, layer: SurfaceLayer, index: usize);
}

/// A view with no window behind it, used when rendering offscreen
#[derive(Debug)]
pub struct HeadlessView {
    bounds: (u32, u32),
    layers: Mutex<Vec<SurfaceLayer>>,
}

impl HeadlessView {
    pub fn new(bounds: (u32, u32)) -> Self {
        Self {
            bounds,
            layers: Mutex::new(Vec::new()),
        }
    }

    /// Layers in stack order, bottommost first
    pub fn layers(&self) -> Vec<SurfaceLayer> {
        self.layers.lock().clone()
    }
}

impl HostView for HeadlessView {
    fn bounds(&self) -> (u32, u32) {
        self.bounds
    }

    fn insert_layer(&self, layer: SurfaceLayer, index: usize) {
        let mut layers = self.layers.lock();
        let index = index.min(layers.len());
        layers.insert(index, layer);
    }
}
