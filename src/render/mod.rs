// SPDX-License-Identifier: GPL-3.0-only

//! Frame renderer
//!
//! [`FrameRenderer`] sits between the capture queue and the display link:
//!
//! - `render()` (capture queue) turns a raw frame into a cached GPU texture and
//!   swaps it in as the current frame.
//! - `draw()` (display link) snapshots the current frame and uniforms, draws a
//!   full-screen quad into the next drawable and queues its presentation.
//! - Presentation completions come back from the GPU and are delivered to the
//!   [`RenderListener`] in submission order.
//!
//! The only state the two sides share is the current-frame slot, guarded by
//! one short critical section on each side. Latest frame wins; nothing queues.

pub mod backend;
pub mod display_link;
mod presentation;
pub mod surface;
pub mod texture_cache;
pub mod uniforms;
pub mod wgpu_backend;

pub use backend::{CompletionHandler, DrawPass, Drawable, GpuBackend};
pub use display_link::DisplayLink;
pub use presentation::RenderListener;
pub use surface::{ClearColor, SurfaceFormat, SurfaceLayer};
pub use texture_cache::{CacheStats, CachedTexture, TextureCache};
pub use uniforms::{GpuUniforms, RenderUniforms};
pub use wgpu_backend::WgpuBackend;

use crate::backends::camera::{PixelBufferId, RawFrame};
use crate::constants::render::{QUAD_VERTEX_COUNT, TEXTURE_CACHE_SLOTS};
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::RenderResult;
use parking_lot::Mutex;
use presentation::PresentationQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};

/// A frame the GPU finished compositing
#[derive(Debug, Clone)]
pub struct RenderedFrame<T> {
    /// The drawable texture the frame was composited into
    pub texture: T,
    /// Pixel buffer the frame was converted from
    pub source: PixelBufferId,
    /// Presentation timestamp of the source frame
    pub timestamp: f64,
    /// Position of the source frame in render order, starting at 1
    pub sequence: u64,
}

/// Renderer construction options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererSettings {
    pub cache_slots: usize,
    pub clear_color: ClearColor,
    pub mirrored: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            cache_slots: TEXTURE_CACHE_SLOTS,
            clear_color: ClearColor::default(),
            mirrored: false,
        }
    }
}

/// Renderer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames converted into a texture
    pub converted: u64,
    /// Frames dropped at conversion
    pub dropped: u64,
    /// Draws submitted
    pub draws: u64,
    /// Display ticks skipped (no frame yet, no drawable, submit failure)
    pub skipped: u64,
    /// Frames delivered to the listener path
    pub presented: u64,
}

struct CurrentFrame<T> {
    texture: Arc<CachedTexture<T>>,
    source: PixelBufferId,
    timestamp: f64,
    sequence: u64,
}

struct RenderState<T> {
    current: Option<CurrentFrame<T>>,
    uniforms: RenderUniforms,
    next_sequence: u64,
    /// Highest sequence already submitted with a notification
    last_notified: u64,
}

/// GPU renderer for captured frames
pub struct FrameRenderer<B: GpuBackend> {
    backend: Arc<B>,
    cache: Mutex<TextureCache<B::Texture>>,
    state: Mutex<RenderState<B::Texture>>,
    presentation: Arc<PresentationQueue<B::Texture>>,
    clear_color: ClearColor,
    converted: AtomicU64,
    dropped: AtomicU64,
    draws: AtomicU64,
    skipped: AtomicU64,
}

impl<B: GpuBackend> FrameRenderer<B> {
    /// Create a renderer over an initialized backend
    pub fn new(backend: B, settings: RendererSettings) -> RenderResult<Self> {
        let cache = TextureCache::new(settings.cache_slots)?;
        info!(
            cache_slots = settings.cache_slots,
            mirrored = settings.mirrored,
            "Frame renderer created"
        );

        Ok(Self {
            backend: Arc::new(backend),
            cache: Mutex::new(cache),
            state: Mutex::new(RenderState {
                current: None,
                uniforms: RenderUniforms {
                    mirrored: settings.mirrored,
                    ..Default::default()
                },
                next_sequence: 1,
                last_notified: 0,
            }),
            presentation: Arc::new(PresentationQueue::new()),
            clear_color: settings.clear_color,
            converted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            draws: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Register the presented-frame consumer; only a weak reference is kept
    pub fn set_listener(&self, listener: Option<Weak<dyn RenderListener<B::Texture>>>) {
        self.presentation.set_listener(listener);
    }

    /// Convert a frame into the current texture
    ///
    /// Safe to call while `draw()` runs on another thread. A frame that cannot
    /// be converted is dropped and the previous frame stays current.
    pub fn render(&self, frame: RawFrame) {
        let buffer = &frame.buffer;

        let texture = {
            let mut cache = self.cache.lock();
            cache.acquire(
                buffer,
                |width, height, format| self.backend.create_texture(width, height, format),
                |texture, buffer| self.backend.upload(texture, buffer),
            )
        };
        let texture = match texture {
            Ok(texture) => texture,
            Err(e) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if e.is_per_frame() {
                    debug!(
                        buffer = %buffer.id(),
                        error = %e,
                        dropped,
                        "Frame dropped at texture conversion"
                    );
                } else {
                    warn!(buffer = %buffer.id(), error = %e, "Texture conversion failed");
                }
                return;
            }
        };
        let dimensions = texture.dimensions();

        let (sequence, resized) = {
            let mut state = self.state.lock();
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            let resized = state
                .current
                .as_ref()
                .is_some_and(|current| current.texture.dimensions() != dimensions);
            state.current = Some(CurrentFrame {
                texture,
                source: buffer.id(),
                timestamp: frame.presentation_time,
                sequence,
            });
            state.uniforms.elapsed_time = frame.presentation_time as f32;
            (sequence, resized)
        };

        if resized {
            // Slots of the old size can only be reallocated one at a time
            debug!(width = dimensions.0, height = dimensions.1, "Frame size changed");
            self.cache.lock().purge_unused();
        }

        self.converted.fetch_add(1, Ordering::Relaxed);
        if sequence % FRAME_LOG_INTERVAL == 0 {
            debug!(
                sequence,
                buffer = %buffer.id(),
                timestamp = frame.presentation_time,
                orientation = %frame.orientation,
                "Frame converted"
            );
        }
    }

    /// Draw the current frame into the next drawable and present it
    ///
    /// Returns whether a draw was submitted. Without a current frame or a free
    /// drawable the tick is skipped.
    pub fn draw(&self) -> bool {
        self.backend.poll();

        let snapshot = {
            let state = self.state.lock();
            state.current.as_ref().map(|current| {
                (
                    Arc::clone(&current.texture),
                    current.source,
                    current.timestamp,
                    current.sequence,
                    state.uniforms,
                )
            })
        };
        let Some((hold, source, timestamp, sequence, uniforms)) = snapshot else {
            trace!("No frame rendered yet, skipping draw");
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let Some(drawable) = self.backend.next_drawable() else {
            trace!("No drawable available, skipping draw");
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let source_texture = hold.texture().clone();

        // The first presentation of each frame is the one that notifies. The
        // decision and the enqueue share one critical section so tickets follow
        // sequence order even with several drawing threads.
        let (ticket, previous_notified) = {
            let mut state = self.state.lock();
            let previous = state.last_notified;
            let frame = (sequence > previous).then(|| RenderedFrame {
                texture: drawable.texture().clone(),
                source,
                timestamp,
                sequence,
            });
            if frame.is_some() {
                state.last_notified = sequence;
            }
            (self.presentation.enqueue(frame, hold), previous)
        };

        let presentation = Arc::clone(&self.presentation);
        let pass = DrawPass {
            source: &source_texture,
            uniforms: uniforms.to_gpu(),
            vertex_count: QUAD_VERTEX_COUNT,
            clear_color: self.clear_color.to_array(),
        };

        if let Err(e) = self.backend.submit(
            pass,
            drawable,
            Box::new(move || presentation.complete(ticket)),
        ) {
            warn!(error = %e, sequence, "Draw submission failed");
            self.presentation.abandon(ticket);
            // Let the next draw of this frame notify instead
            let mut state = self.state.lock();
            if state.last_notified == sequence {
                state.last_notified = previous_notified;
            }
            drop(state);
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let draws = self.draws.fetch_add(1, Ordering::Relaxed) + 1;
        if draws % FRAME_LOG_INTERVAL == 0 {
            debug!(draws, sequence, mirrored = uniforms.mirrored, "Draw submitted");
        }
        true
    }

    /// Mirror horizontally from the next draw on
    pub fn set_mirroring_enabled(&self, enabled: bool) {
        self.state.lock().uniforms.mirrored = enabled;
        debug!(enabled, "Mirroring changed");
    }

    pub fn is_mirroring_enabled(&self) -> bool {
        self.state.lock().uniforms.mirrored
    }

    /// Uniforms the next draw will use
    pub fn uniforms(&self) -> RenderUniforms {
        self.state.lock().uniforms
    }

    /// Pixel buffer the current texture was converted from
    pub fn current_source(&self) -> Option<PixelBufferId> {
        self.state.lock().current.as_ref().map(|current| current.source)
    }

    /// Draws submitted whose completion has not been delivered yet
    pub fn pending_presentations(&self) -> usize {
        self.presentation.pending()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    pub fn stats(&self) -> RenderStats {
        RenderStats {
            converted: self.converted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            draws: self.draws.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            presented: self.presentation.presented(),
        }
    }
}

impl<B: GpuBackend> Drop for FrameRenderer<B> {
    fn drop(&mut self) {
        let stats = self.stats();
        info!(
            converted = stats.converted,
            dropped = stats.dropped,
            draws = stats.draws,
            presented = stats.presented,
            "Frame renderer released"
        );
    }
}
