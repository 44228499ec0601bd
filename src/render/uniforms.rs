// SPDX-License-Identifier: GPL-3.0-only

//! Per-draw uniform state

/// Uniform block as laid out in the shader (16 bytes)
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuUniforms {
    /// Reserved; the shader does not read it
    pub offset: [f32; 2],
    pub elapsed_time: f32,
    /// Non-zero flips the quad horizontally
    pub is_mirrored: u32,
}

/// Uniform values the renderer keeps between draws
///
/// Copied by value into every draw, so a change only affects later draws.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderUniforms {
    pub mirrored: bool,
    pub offset: [f32; 2],
    /// Timestamp of the last converted frame, in seconds
    pub elapsed_time: f32,
}

impl RenderUniforms {
    pub fn to_gpu(&self) -> GpuUniforms {
        GpuUniforms {
            offset: self.offset,
            elapsed_time: self.elapsed_time,
            is_mirrored: u32::from(self.mirrored),
        }
    }
}
