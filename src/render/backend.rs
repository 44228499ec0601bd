// SPDX-License-Identifier: GPL-3.0-only

//! GPU backend abstraction
//!
//! The renderer owns the frame bookkeeping (current texture, uniforms,
//! presentation order); a [`GpuBackend`] owns the device objects: texture
//! storage for the cache, the drawable ring and pipeline submission.

use super::uniforms::GpuUniforms;
use crate::backends::camera::{PixelBuffer, PixelFormat};
use crate::errors::RenderResult;

/// Called once the GPU has finished a submitted draw
pub type CompletionHandler = Box<dyn FnOnce() + Send + 'static>;

/// A render target that is presented after its draw is submitted
pub trait Drawable: Send + 'static {
    type Texture: Clone + Send + Sync + 'static;

    /// The texture the draw writes into
    fn texture(&self) -> &Self::Texture;

    /// Size in pixels
    fn size(&self) -> (u32, u32);
}

/// Everything one full-screen quad draw needs
pub struct DrawPass<'a, T> {
    /// Texture bound at binding 0
    pub source: &'a T,
    pub uniforms: GpuUniforms,
    /// Triangle-strip vertex count
    pub vertex_count: u32,
    /// RGBA clear color of the drawable
    pub clear_color: [f64; 4],
}

/// Device-side operations the renderer depends on
pub trait GpuBackend: Send + Sync + 'static {
    type Texture: Clone + Send + Sync + 'static;
    type Drawable: Drawable<Texture = Self::Texture>;

    /// Allocate a sampleable texture; `UnsupportedFormat` if it has no mapping
    fn create_texture(&self, width: u32, height: u32, format: PixelFormat)
    -> RenderResult<Self::Texture>;

    /// Copy a pixel buffer into a texture created with its size and format
    fn upload(&self, texture: &Self::Texture, buffer: &PixelBuffer) -> RenderResult<()>;

    /// Next free drawable, `None` while every drawable is in flight
    fn next_drawable(&self) -> Option<Self::Drawable>;

    /// Encode and submit the draw, then present the drawable
    ///
    /// `on_complete` runs exactly once after the GPU finishes. If submission
    /// fails it is dropped without being called.
    fn submit(
        &self,
        pass: DrawPass<'_, Self::Texture>,
        drawable: Self::Drawable,
        on_complete: CompletionHandler,
    ) -> RenderResult<()>;

    /// Process finished work so completion handlers can run
    fn poll(&self) {}
}
