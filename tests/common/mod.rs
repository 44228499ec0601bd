// SPDX-License-Identifier: GPL-3.0-only

//! Shared test doubles: an in-memory GPU backend and frame helpers

#![allow(dead_code)]

use livecam::backends::camera::{
    FrameData, PixelBuffer, PixelBufferId, PixelFormat, RawFrame, VideoOrientation,
};
use livecam::errors::{RenderError, RenderResult};
use livecam::render::{
    CompletionHandler, DrawPass, Drawable, GpuBackend, GpuUniforms, RenderListener, RenderedFrame,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Texture handle of the mock backend
#[derive(Debug, Clone)]
pub struct MockTexture {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    /// Buffer last uploaded into this texture (drawables: never set)
    pub contents: Arc<Mutex<Option<PixelBufferId>>>,
}

impl MockTexture {
    pub fn contents(&self) -> Option<PixelBufferId> {
        *self.contents.lock()
    }
}

impl PartialEq for MockTexture {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// One recorded draw submission
#[derive(Debug, Clone)]
pub struct Submission {
    /// Buffer the source texture held when the draw was encoded
    pub source: Option<PixelBufferId>,
    pub uniforms: GpuUniforms,
    pub vertex_count: u32,
    pub drawable: u32,
}

#[derive(Default)]
struct MockState {
    next_texture: u32,
    busy: Vec<bool>,
    pending: Vec<(u32, CompletionHandler)>,
    submissions: Vec<Submission>,
    uploads: Vec<PixelBufferId>,
    fail_submissions: bool,
}

/// In-memory [`GpuBackend`]
///
/// Completions are held until the test releases them, unless the backend was
/// created with `auto_complete`, in which case `poll()` completes everything.
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    auto_complete: bool,
}

impl MockBackend {
    /// Completions released only by `complete_*`
    pub fn deferred(drawables: usize) -> Self {
        Self::build(drawables, false)
    }

    /// Completions released on every `poll()` (the renderer polls before each draw)
    pub fn auto_complete(drawables: usize) -> Self {
        Self::build(drawables, true)
    }

    fn build(drawables: usize, auto_complete: bool) -> Self {
        let state = MockState {
            busy: vec![false; drawables],
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            auto_complete,
        }
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    pub fn uploads(&self) -> Vec<PixelBufferId> {
        self.state.lock().uploads.clone()
    }

    pub fn pending_completions(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn set_fail_submissions(&self, fail: bool) {
        self.state.lock().fail_submissions = fail;
    }

    /// Complete the oldest pending draw
    pub fn complete_next(&self) -> bool {
        let entry = {
            let mut state = self.state.lock();
            if state.pending.is_empty() {
                None
            } else {
                Some(state.pending.remove(0))
            }
        };
        self.finish(entry)
    }

    /// Complete the newest pending draw
    pub fn complete_last(&self) -> bool {
        let entry = self.state.lock().pending.pop();
        self.finish(entry)
    }

    pub fn complete_all(&self) {
        while self.complete_next() {}
    }

    fn finish(&self, entry: Option<(u32, CompletionHandler)>) -> bool {
        let Some((drawable, handler)) = entry else {
            return false;
        };
        self.state.lock().busy[drawable as usize] = false;
        handler();
        true
    }
}

pub struct MockDrawable {
    index: u32,
    texture: MockTexture,
    state: Arc<Mutex<MockState>>,
    submitted: bool,
}

impl Drawable for MockDrawable {
    type Texture = MockTexture;

    fn texture(&self) -> &MockTexture {
        &self.texture
    }

    fn size(&self) -> (u32, u32) {
        (self.texture.width, self.texture.height)
    }
}

impl Drop for MockDrawable {
    fn drop(&mut self) {
        if !self.submitted {
            self.state.lock().busy[self.index as usize] = false;
        }
    }
}

pub const DRAWABLE_TEXTURE_BASE: u32 = 1000;

impl GpuBackend for MockBackend {
    type Texture = MockTexture;
    type Drawable = MockDrawable;

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> RenderResult<MockTexture> {
        if format == PixelFormat::Nv12 {
            return Err(RenderError::UnsupportedFormat(format.to_string()));
        }
        let mut state = self.state.lock();
        state.next_texture += 1;
        Ok(MockTexture {
            id: state.next_texture,
            width,
            height,
            contents: Arc::new(Mutex::new(None)),
        })
    }

    fn upload(&self, texture: &MockTexture, buffer: &PixelBuffer) -> RenderResult<()> {
        if !buffer.is_well_formed() {
            return Err(RenderError::Upload(format!("buffer {}", buffer.id())));
        }
        *texture.contents.lock() = Some(buffer.id());
        self.state.lock().uploads.push(buffer.id());
        Ok(())
    }

    fn next_drawable(&self) -> Option<MockDrawable> {
        let mut state = self.state.lock();
        let index = state.busy.iter().position(|busy| !busy)?;
        state.busy[index] = true;
        Some(MockDrawable {
            index: index as u32,
            texture: MockTexture {
                id: DRAWABLE_TEXTURE_BASE + index as u32,
                width: 4,
                height: 8,
                contents: Arc::new(Mutex::new(None)),
            },
            state: Arc::clone(&self.state),
            submitted: false,
        })
    }

    fn submit(
        &self,
        pass: DrawPass<'_, MockTexture>,
        mut drawable: MockDrawable,
        on_complete: CompletionHandler,
    ) -> RenderResult<()> {
        let mut state = self.state.lock();
        if state.fail_submissions {
            drop(state);
            return Err(RenderError::Submission("mock failure".to_string()));
        }
        drawable.submitted = true;
        state.submissions.push(Submission {
            source: pass.source.contents(),
            uniforms: pass.uniforms,
            vertex_count: pass.vertex_count,
            drawable: drawable.index,
        });
        state.pending.push((drawable.index, on_complete));
        drop(state);
        Ok(())
    }

    fn poll(&self) {
        if self.auto_complete {
            self.complete_all();
        }
    }
}

/// A frame backed by a distinct packed BGRA buffer
pub fn frame(id: u64, timestamp: f64) -> RawFrame {
    sized_frame(id, timestamp, 4, 4)
}

pub fn sized_frame(id: u64, timestamp: f64, width: u32, height: u32) -> RawFrame {
    let data = vec![id as u8; (width * height * 4) as usize];
    RawFrame {
        buffer: PixelBuffer::packed(
            PixelBufferId(id),
            width,
            height,
            PixelFormat::Bgra,
            FrameData::from(data),
        ),
        presentation_time: timestamp,
        orientation: VideoOrientation::Portrait,
    }
}

/// Records every presented frame
#[derive(Default)]
pub struct RecordingListener {
    frames: Mutex<Vec<RenderedFrame<MockTexture>>>,
}

impl RecordingListener {
    pub fn frames(&self) -> Vec<RenderedFrame<MockTexture>> {
        self.frames.lock().clone()
    }

    pub fn sources(&self) -> Vec<PixelBufferId> {
        self.frames.lock().iter().map(|frame| frame.source).collect()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().len()
    }
}

impl RenderListener<MockTexture> for RecordingListener {
    fn did_render(&self, frame: &RenderedFrame<MockTexture>) {
        self.frames.lock().push(frame.clone());
    }
}

/// Type-erase a listener the way the renderer stores it
pub fn listener(recorder: &Arc<RecordingListener>) -> std::sync::Weak<dyn RenderListener<MockTexture>> {
    let weak = Arc::downgrade(recorder);
    weak
}
