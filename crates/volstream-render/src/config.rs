//! Render configuration.

use glam::UVec3;
use serde::{Deserialize, Serialize};
use volstream_gpu::Filter;

/// How samples along a ray are combined.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Front-to-back "over" compositing.
    #[default]
    Composite = 0,
    /// Sum of opacity-weighted samples.
    Additive = 1,
    /// Largest sample along the ray.
    MaximumIntensity = 2,
}

impl BlendMode {
    /// The mode as a u32 for shader uniforms.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Texture sampling mode for volume and table textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    #[default]
    Linear,
}

impl Interpolation {
    pub const fn filter(self) -> Filter {
        match self {
            Self::Nearest => Filter::Nearest,
            Self::Linear => Filter::Linear,
        }
    }
}

/// Configuration of a [`VolumeMapper`](crate::VolumeMapper).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeRenderConfig {
    /// Block counts along x, y and z.
    pub partitions: [u32; 3],
    pub interpolation: Interpolation,
    pub blend_mode: BlendMode,
    /// Ray step in world units, unless auto-adjusted.
    pub sample_distance: f32,
    /// Derive the step from the volume spacing instead.
    pub auto_adjust_sample_distance: bool,
    /// Step coarsening applied by auto-adjust, in `(0, 1)`.
    pub reduction_factor: f32,
    pub final_color_window: f32,
    pub final_color_level: f32,
    /// Minimum lookup table width.
    pub table_width: u32,
}

impl Default for VolumeRenderConfig {
    fn default() -> Self {
        Self {
            partitions: [1, 1, 1],
            interpolation: Interpolation::Linear,
            blend_mode: BlendMode::Composite,
            sample_distance: 1.0,
            auto_adjust_sample_distance: false,
            reduction_factor: 1.0,
            final_color_window: 1.0,
            final_color_level: 0.5,
            table_width: 1024,
        }
    }
}

impl VolumeRenderConfig {
    pub fn partitions(&self) -> UVec3 {
        UVec3::from(self.partitions)
    }

    /// Global intensity `(scale, bias)` from the final color window/level.
    pub fn intensity_scale_bias(&self) -> (f32, f32) {
        let window = if self.final_color_window.abs() > f32::EPSILON {
            self.final_color_window
        } else {
            1.0
        };
        (1.0 / window, 0.5 - self.final_color_level / window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_window_level_is_identity() {
        let (scale, bias) = VolumeRenderConfig::default().intensity_scale_bias();
        assert_relative_eq!(scale, 1.0);
        assert_relative_eq!(bias, 0.0);
    }

    #[test]
    fn window_level_maps_level_to_half() {
        let config = VolumeRenderConfig {
            final_color_window: 2.0,
            final_color_level: 3.0,
            ..Default::default()
        };
        let (scale, bias) = config.intensity_scale_bias();
        assert_relative_eq!(3.0f32.mul_add(scale, bias), 0.5);
    }

    #[test]
    fn interpolation_maps_to_filter() {
        assert_eq!(Interpolation::Nearest.filter(), Filter::Nearest);
        assert_eq!(Interpolation::default().filter(), Filter::Linear);
    }
}
