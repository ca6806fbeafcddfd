//! Shader uniform block for one block draw.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use volstream_core::constants::MAX_COMPONENTS;
use volstream_gpu::TextureHandle;
use volstream_volume::{Block, ScaleBias};

/// Uniforms consumed by the ray-casting program for one block.
///
/// Every vector is padded to four floats so the block can be bound as a
/// std140 uniform buffer without repacking:
/// ```glsl
/// layout(std140) uniform VolumeUniforms {
///     vec4 volume_scale;          // per-component texel scale
///     vec4 volume_bias;           // per-component texel bias
///     vec4 scalars_range_min;
///     vec4 scalars_range_max;
///     vec4 component_weight;
///     vec4 cell_step;             // xyz: texture step between samples
///     vec4 cell_scale;            // xyz: world size of one texel
///     vec4 cell_spacing;          // xyz: volume spacing
///     vec4 camera_position;
///     vec4 projection_direction;
///     vec4 volume_extents_min;    // world bounds of the block
///     vec4 volume_extents_max;
///     vec4 texture_extents_min;   // index-space extent of the block
///     vec4 texture_extents_max;
///     vec4 tex_min;               // texture coordinates rays stay within
///     vec4 tex_max;
///     float sample_distance;
///     float intensity_scale;
///     float intensity_bias;
///     uint components;
///     uint independent_components;
///     uint blend_mode;
///     uint camera_inside;
///     uint parallel_projection;
/// };
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub volume_scale: [f32; 4],
    pub volume_bias: [f32; 4],
    pub scalars_range_min: [f32; 4],
    pub scalars_range_max: [f32; 4],
    pub component_weight: [f32; 4],
    pub cell_step: [f32; 4],
    pub cell_scale: [f32; 4],
    pub cell_spacing: [f32; 4],
    pub camera_position: [f32; 4],
    pub projection_direction: [f32; 4],
    pub volume_extents_min: [f32; 4],
    pub volume_extents_max: [f32; 4],
    pub texture_extents_min: [f32; 4],
    pub texture_extents_max: [f32; 4],
    pub tex_min: [f32; 4],
    pub tex_max: [f32; 4],
    pub sample_distance: f32,
    pub intensity_scale: f32,
    pub intensity_bias: f32,
    pub components: u32,
    pub independent_components: u32,
    pub blend_mode: u32,
    pub camera_inside: u32,
    pub parallel_projection: u32,
}

impl DrawUniforms {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// Fill the per-component scale/bias, unused components get the
    /// identity.
    pub fn set_scale_bias(&mut self, scale_bias: &[ScaleBias]) {
        self.volume_scale = [1.0; 4];
        self.volume_bias = [0.0; 4];
        for (c, sb) in scale_bias.iter().take(MAX_COMPONENTS).enumerate() {
            let [scale, bias] = sb.to_f32();
            self.volume_scale[c] = scale;
            self.volume_bias[c] = bias;
        }
    }

    /// Fill the fields that differ between blocks of one volume.
    pub fn set_block(&mut self, block: &Block, tex_bounds: (Vec3, Vec3)) {
        let bounds = block.bounds();
        let texels = block.texture_size().as_vec3();
        let extent = block.extent();
        self.cell_step = vec4(block.cell_step());
        self.cell_scale = vec4(bounds.size() / texels);
        self.volume_extents_min = vec4(bounds.min);
        self.volume_extents_max = vec4(bounds.max);
        self.texture_extents_min = vec4(extent.min.as_vec3());
        self.texture_extents_max = vec4(extent.max.as_vec3());
        self.tex_min = vec4(tex_bounds.0);
        self.tex_max = vec4(tex_bounds.1);
    }
}

/// Pad a vector for std140.
pub fn vec4(v: Vec3) -> [f32; 4] {
    v.extend(0.0).to_array()
}

/// Table textures bound for a draw, indexed by component.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableBindings {
    pub color: [Option<TextureHandle>; MAX_COMPONENTS],
    pub scalar_opacity: [Option<TextureHandle>; MAX_COMPONENTS],
    pub gradient_opacity: [Option<TextureHandle>; MAX_COMPONENTS],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_std140_sized() {
        assert_eq!(DrawUniforms::SIZE, 16 * 16 + 8 * 4);
        assert_eq!(DrawUniforms::SIZE % 16, 0);
    }

    #[test]
    fn missing_components_keep_identity() {
        let mut uniforms = DrawUniforms::default();
        uniforms.set_scale_bias(&[ScaleBias {
            scale: 2.0,
            bias: -1.0,
        }]);
        assert_eq!(uniforms.volume_scale, [2.0, 1.0, 1.0, 1.0]);
        assert_eq!(uniforms.volume_bias, [-1.0, 0.0, 0.0, 0.0]);
    }
}
