// SPDX-License-Identifier: GPL-3.0-only

//! wgpu implementation of [`GpuBackend`]
//!
//! Draws into a ring of offscreen BGRA8 textures that stands in for the
//! on-screen swapchain. A drawable is busy from `next_drawable()` until the
//! GPU reports its submission done; `next_drawable()` returns `None` while the
//! whole ring is busy, which makes the display link skip that refresh.

use super::backend::{CompletionHandler, DrawPass, Drawable, GpuBackend};
use super::surface::SurfaceLayer;
use crate::backends::camera::{PixelBuffer, PixelFormat};
use crate::constants::render::{DRAWABLE_COUNT, FRAGMENT_ENTRY_POINT, VERTEX_ENTRY_POINT};
use crate::errors::{RenderError, RenderResult};
use crate::gpu::{GpuDeviceInfo, create_render_device};
use crate::shaders::VIDEO_SHADER;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info, trace};

struct DrawableSlot {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    in_flight: Arc<AtomicBool>,
}

/// A drawable of the offscreen ring
pub struct WgpuDrawable {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    /// Released on drop unless a submission took it over
    in_flight: Option<Arc<AtomicBool>>,
}

impl Drawable for WgpuDrawable {
    type Texture = wgpu::Texture;

    fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }
}

impl Drop for WgpuDrawable {
    fn drop(&mut self) {
        if let Some(flag) = self.in_flight.take() {
            flag.store(false, Ordering::Release);
        }
    }
}

/// Renderer device objects: pipeline, sampler, uniform buffer and drawables
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: Option<GpuDeviceInfo>,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    drawables: Vec<DrawableSlot>,
    next_drawable: AtomicUsize,
    max_texture_dimension: u32,
}

impl WgpuBackend {
    /// Create a device and build the backend for `layer`
    pub async fn create(label: &str, layer: &SurfaceLayer) -> RenderResult<Self> {
        let (device, queue, info) = create_render_device(label).await?;
        let mut backend = Self::new(device, queue, layer)?;
        backend.info = Some(info);
        Ok(backend)
    }

    /// Build the pipeline and drawable ring on an existing device
    ///
    /// Shader or pipeline validation errors are returned as
    /// `PipelineCompilation` instead of reaching the device's error handler.
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        layer: &SurfaceLayer,
    ) -> RenderResult<Self> {
        let format = layer.pixel_format.to_wgpu();

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("livecam video shader"),
            source: wgpu::ShaderSource::Wgsl(VIDEO_SHADER.into()),
        });

        // Bind group layout for frame texture, sampler and uniforms
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("livecam video bind group layout"),
            entries: &[
                // Frame texture
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // Uniforms (mirror flag read by the vertex stage)
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("livecam video pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("livecam video pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some(VERTEX_ENTRY_POINT),
                buffers: &[],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(FRAGMENT_ENTRY_POINT),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::PipelineCompilation(error.to_string()));
        }

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("livecam video sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("livecam video uniforms"),
            size: std::mem::size_of::<super::GpuUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let (width, height) = layer.drawable_size;
        let usage = drawable_usage(layer);
        let drawables = (0..DRAWABLE_COUNT)
            .map(|_| {
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("livecam drawable"),
                    size: wgpu::Extent3d {
                        width: width.max(1),
                        height: height.max(1),
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage,
                    view_formats: &[],
                });
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                DrawableSlot {
                    texture,
                    view,
                    in_flight: Arc::new(AtomicBool::new(false)),
                }
            })
            .collect();

        let max_texture_dimension = device.limits().max_texture_dimension_2d;
        info!(
            width,
            height,
            drawables = DRAWABLE_COUNT,
            format = ?format,
            "wgpu render backend ready"
        );

        Ok(Self {
            device,
            queue,
            info: None,
            pipeline,
            bind_group_layout,
            sampler,
            uniform_buffer,
            drawables,
            next_drawable: AtomicUsize::new(0),
            max_texture_dimension,
        })
    }

    /// Adapter details, when the backend created its own device
    pub fn device_info(&self) -> Option<&GpuDeviceInfo> {
        self.info.as_ref()
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Drawables currently waiting on the GPU
    pub fn drawables_in_flight(&self) -> usize {
        self.drawables
            .iter()
            .filter(|slot| slot.in_flight.load(Ordering::Acquire))
            .count()
    }
}

/// Drawables stay readable unless the layer is framebuffer-only
fn drawable_usage(layer: &SurfaceLayer) -> wgpu::TextureUsages {
    let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
    if !layer.framebuffer_only {
        usage |= wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::TEXTURE_BINDING;
    }
    usage
}

fn texture_format(format: PixelFormat) -> RenderResult<wgpu::TextureFormat> {
    match format {
        PixelFormat::Bgra => Ok(wgpu::TextureFormat::Bgra8Unorm),
        PixelFormat::Rgba => Ok(wgpu::TextureFormat::Rgba8Unorm),
        PixelFormat::Nv12 => Err(RenderError::UnsupportedFormat(format.to_string())),
    }
}

impl GpuBackend for WgpuBackend {
    type Texture = wgpu::Texture;
    type Drawable = WgpuDrawable;

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> RenderResult<wgpu::Texture> {
        let texture_format = texture_format(format)?;
        if width == 0
            || height == 0
            || width > self.max_texture_dimension
            || height > self.max_texture_dimension
        {
            return Err(RenderError::Upload(format!(
                "{}x{} outside device texture limits (max {})",
                width, height, self.max_texture_dimension
            )));
        }

        debug!(width, height, format = %format, "Creating frame texture");
        Ok(self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("livecam frame texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        }))
    }

    fn upload(&self, texture: &wgpu::Texture, buffer: &PixelBuffer) -> RenderResult<()> {
        if !buffer.is_well_formed() {
            return Err(RenderError::Upload(format!(
                "buffer {} has {} bytes for {}x{} at stride {}",
                buffer.id(),
                buffer.data().len(),
                buffer.width(),
                buffer.height(),
                buffer.stride()
            )));
        }
        if texture.width() != buffer.width() || texture.height() != buffer.height() {
            return Err(RenderError::Upload(format!(
                "buffer {}x{} does not match texture {}x{}",
                buffer.width(),
                buffer.height(),
                texture.width(),
                texture.height()
            )));
        }

        // Direct upload using the buffer's stride; padding rows are skipped by the copy
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &buffer.data()[..buffer.required_len()],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(buffer.stride()),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: buffer.width(),
                height: buffer.height(),
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn next_drawable(&self) -> Option<WgpuDrawable> {
        let count = self.drawables.len();
        let start = self.next_drawable.load(Ordering::Relaxed);

        for offset in 0..count {
            let index = (start + offset) % count;
            let slot = &self.drawables[index];
            if slot
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.next_drawable.store((index + 1) % count, Ordering::Relaxed);
                return Some(WgpuDrawable {
                    texture: slot.texture.clone(),
                    view: slot.view.clone(),
                    in_flight: Some(Arc::clone(&slot.in_flight)),
                });
            }
        }

        trace!(count, "All drawables in flight");
        None
    }

    fn submit(
        &self,
        pass: DrawPass<'_, wgpu::Texture>,
        mut drawable: WgpuDrawable,
        on_complete: CompletionHandler,
    ) -> RenderResult<()> {
        let Some(in_flight) = drawable.in_flight.take() else {
            return Err(RenderError::Submission(
                "drawable was already submitted".to_string(),
            ));
        };

        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&pass.uniforms));

        let source_view = pass
            .source
            .create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("livecam video bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("livecam draw encoder"),
            });

        {
            let [r, g, b, a] = pass.clear_color;
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("livecam video render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &drawable.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..pass.vertex_count, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.queue.on_submitted_work_done(move || {
            in_flight.store(false, Ordering::Release);
            on_complete();
        });

        // Presenting an offscreen drawable is handing it back to the ring
        drop(drawable);
        let _ = self.device.poll(wgpu::PollType::Poll);
        Ok(())
    }

    fn poll(&self) {
        let _ = self.device.poll(wgpu::PollType::Poll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{FrameData, PixelBufferId};
    use crate::render::surface::ClearColor;
    use std::sync::mpsc;
    use std::time::Duration;

    fn small_layer() -> SurfaceLayer {
        SurfaceLayer::new((16, 32), ClearColor::BLACK, 30)
    }

    #[tokio::test]
    async fn test_backend_draws_and_completes() {
        let backend = match WgpuBackend::create("test_backend", &small_layer()).await {
            Ok(backend) => backend,
            Err(e) => {
                // Skip if no GPU available
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };

        let texture = backend.create_texture(8, 4, PixelFormat::Bgra).unwrap();
        let buffer = PixelBuffer::packed(
            PixelBufferId(1),
            8,
            4,
            PixelFormat::Bgra,
            FrameData::from(vec![255u8; 8 * 4 * 4]),
        );
        backend.upload(&texture, &buffer).unwrap();

        let drawable = backend.next_drawable().unwrap();
        assert_eq!(drawable.size(), (16, 32));
        let (tx, rx) = mpsc::channel();
        let pass = DrawPass {
            source: &texture,
            uniforms: crate::render::RenderUniforms::default().to_gpu(),
            vertex_count: 4,
            clear_color: ClearColor::BLACK.to_array(),
        };
        backend
            .submit(pass, drawable, Box::new(move || tx.send(()).unwrap()))
            .unwrap();

        let mut completed = false;
        for _ in 0..500 {
            backend.poll();
            if rx.recv_timeout(Duration::from_millis(10)).is_ok() {
                completed = true;
                break;
            }
        }
        assert!(completed);
        assert_eq!(backend.drawables_in_flight(), 0);
    }

    #[test]
    fn test_drawable_usage_allows_readback() {
        let usage = drawable_usage(&small_layer());
        assert!(usage.contains(
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING
        ));

        let layer = SurfaceLayer {
            framebuffer_only: true,
            ..small_layer()
        };
        assert_eq!(drawable_usage(&layer), wgpu::TextureUsages::RENDER_ATTACHMENT);
    }

    #[tokio::test]
    async fn test_presented_drawable_can_be_copied() {
        let backend = match WgpuBackend::create("test_readback", &small_layer()).await {
            Ok(backend) => backend,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };

        let drawable = backend.next_drawable().unwrap();
        let usage = drawable.texture().usage();
        assert!(usage.contains(wgpu::TextureUsages::COPY_SRC));
        assert!(usage.contains(wgpu::TextureUsages::TEXTURE_BINDING));
    }

    #[tokio::test]
    async fn test_drawable_ring_and_formats() {
        let backend = match WgpuBackend::create("test_ring", &small_layer()).await {
            Ok(backend) => backend,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };

        assert!(matches!(
            backend.create_texture(4, 4, PixelFormat::Nv12),
            Err(RenderError::UnsupportedFormat(_))
        ));

        let held: Vec<_> = (0..DRAWABLE_COUNT)
            .filter_map(|_| backend.next_drawable())
            .collect();
        assert_eq!(held.len(), DRAWABLE_COUNT);
        assert!(backend.next_drawable().is_none());

        // Dropping an unsubmitted drawable returns it to the ring
        drop(held);
        assert_eq!(backend.drawables_in_flight(), 0);
        assert!(backend.next_drawable().is_some());
    }

    #[tokio::test]
    async fn test_upload_rejects_short_buffer() {
        let backend = match WgpuBackend::create("test_upload", &small_layer()).await {
            Ok(backend) => backend,
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                return;
            }
        };

        let texture = backend.create_texture(4, 4, PixelFormat::Rgba).unwrap();
        let short = PixelBuffer::packed(
            PixelBufferId(2),
            4,
            4,
            PixelFormat::Rgba,
            FrameData::from(vec![0u8; 10]),
        );
        assert!(matches!(
            backend.upload(&texture, &short),
            Err(RenderError::Upload(_))
        ));
    }
}
