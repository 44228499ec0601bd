// SPDX-License-Identifier: GPL-3.0-only

//! GPU initialization utilities for the frame renderer.
//!
//! This module provides the helper that picks an adapter and creates the wgpu
//! device and queue the renderer draws with. Rendering is offscreen, so no
//! surface is needed to choose the adapter.

use crate::errors::{RenderError, RenderResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Re-export wgpu so hosts can name the texture types the renderer hands out
pub use wgpu;

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, Metal, ...)
    pub backend: wgpu::Backend,
    /// Largest 2D texture dimension the device accepts
    pub max_texture_dimension: u32,
}

/// Create a wgpu device and queue for rendering.
///
/// # Arguments
///
/// * `label` - A label for the device (for debugging)
///
/// # Returns
///
/// A tuple of (Device, Queue, GpuDeviceInfo), or `NoAdapter` / `DeviceRequest`
pub async fn create_render_device(
    label: &str,
) -> RenderResult<(Arc<wgpu::Device>, Arc<wgpu::Queue>, GpuDeviceInfo)> {
    info!(label = label, "Creating GPU device for rendering");

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::VULKAN | wgpu::Backends::METAL,
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| RenderError::NoAdapter(e.to_string()))?;

    let adapter_info = adapter.get_info();

    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        "GPU adapter selected for rendering"
    );

    // Defaults are enough for a textured quad; keep the adapter's texture size
    let required_limits = wgpu::Limits {
        max_texture_dimension_2d: adapter.limits().max_texture_dimension_2d,
        ..wgpu::Limits::downlevel_defaults()
    };
    debug!(
        max_texture_dimension = required_limits.max_texture_dimension_2d,
        "Requesting device limits"
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: required_limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await
        .map_err(|e| RenderError::DeviceRequest(e.to_string()))?;

    let info = GpuDeviceInfo {
        adapter_name: adapter_info.name.clone(),
        backend: adapter_info.backend,
        max_texture_dimension: required_limits.max_texture_dimension_2d,
    };

    Ok((Arc::new(device), Arc::new(queue), info))
}
