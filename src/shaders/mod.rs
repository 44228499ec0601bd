// SPDX-License-Identifier: GPL-3.0-only
//! Shader sources
//!
//! The renderer draws every frame with a single shader: a full-screen quad
//! sampling the current frame texture, flipped horizontally when mirroring is on.
//!
//! Bindings (group 0):
//! - 0: frame texture (`texture_2d<f32>`)
//! - 1: sampler (nearest)
//! - 2: uniforms (`offset`, `elapsed_time`, `is_mirrored`; 16 bytes)

/// Video quad shader (WGSL)
/// Entry points: `vertex_default_video_shader`, `fragment_default_video_shader`
pub const VIDEO_SHADER: &str = include_str!("video_shader.wgsl");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::render::{FRAGMENT_ENTRY_POINT, VERTEX_ENTRY_POINT};

    /// Validate that a WGSL shader compiles successfully using naga
    fn validate_shader(name: &str, source: &str) -> naga::Module {
        let result = naga::front::wgsl::parse_str(source);
        match result {
            Ok(module) => {
                // Validate the parsed module
                let info = naga::valid::Validator::new(
                    naga::valid::ValidationFlags::all(),
                    naga::valid::Capabilities::all(),
                )
                .validate(&module);

                if let Err(e) = info {
                    panic!("Shader '{}' validation failed: {:?}", name, e);
                }
                module
            }
            Err(e) => {
                panic!("Shader '{}' parse failed: {:?}", name, e);
            }
        }
    }

    #[test]
    fn test_video_shader_validates() {
        validate_shader("video", VIDEO_SHADER);
    }

    #[test]
    fn test_video_shader_entry_points() {
        let module = validate_shader("video", VIDEO_SHADER);
        let stage_of = |name: &str| {
            module
                .entry_points
                .iter()
                .find(|entry| entry.name == name)
                .map(|entry| entry.stage)
        };

        assert_eq!(stage_of(VERTEX_ENTRY_POINT), Some(naga::ShaderStage::Vertex));
        assert_eq!(
            stage_of(FRAGMENT_ENTRY_POINT),
            Some(naga::ShaderStage::Fragment)
        );
        assert_eq!(module.entry_points.len(), 2);
    }

    #[test]
    fn test_uniform_block_matches_gpu_struct() {
        let module = validate_shader("video", VIDEO_SHADER);
        let uniforms = module
            .types
            .iter()
            .find(|(_, ty)| ty.name.as_deref() == Some("Uniforms"))
            .map(|(_, ty)| ty)
            .expect("Uniforms struct");

        match &uniforms.inner {
            naga::TypeInner::Struct { members, span } => {
                assert_eq!(
                    *span as usize,
                    std::mem::size_of::<crate::render::GpuUniforms>()
                );
                let names: Vec<_> = members.iter().filter_map(|m| m.name.as_deref()).collect();
                assert_eq!(names, ["offset", "elapsed_time", "is_mirrored"]);
            }
            other => panic!("Uniforms is not a struct: {:?}", other),
        }
    }
}
