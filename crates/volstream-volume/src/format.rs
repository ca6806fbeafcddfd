//! Texture encoding selection and scale/bias computation.
//!
//! Two affine maps are involved when a voxel reaches the shader:
//!
//! 1. The *type* map applied by the sampler itself: normalized integer formats
//!    return `raw / 255` (`u8`), `raw / 127` (`i8`), `raw / 65535` (`u16`) or
//!    `raw / 32767` (`i16`), float formats return the raw value.
//! 2. The published per-component [`ScaleBias`], applied in the shader to the
//!    sampled texel, mapping the array's finite range `[lo, hi]` to `[0, 1]`.
//!
//! Types without a matching normalized texture format (32/64-bit integers and
//! `f64`) are converted on the host to `f32` already normalized to `[0, 1]`,
//! so their published scale/bias is the identity.

use volstream_core::{ComponentArray, ScalarType};
use volstream_gpu::{ChannelKind, TexelFormat};

use crate::error::Result;

/// Ranges narrower than this (in texel units) are treated as a single value.
const DEGENERATE_RANGE: f64 = 1e-12;

/// How voxel data reaches the texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conversion {
    /// Bytes are uploaded straight from the component array.
    Direct,
    /// Converted to normalized `f32` on the host, one slice at a time.
    HostToFloat,
}

/// Affine map `value * scale + bias`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleBias {
    pub scale: f64,
    pub bias: f64,
}

impl ScaleBias {
    /// The identity map.
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        bias: 0.0,
    };

    /// Map `[a, b]` onto `[0, 1]`.
    ///
    /// A degenerate interval maps every value to `value - a`, so `a` itself
    /// lands on `0` instead of producing an infinite scale.
    pub fn normalizing(a: f64, b: f64) -> Self {
        let width = b - a;
        if width.abs() < DEGENERATE_RANGE {
            return Self {
                scale: 1.0,
                bias: -a,
            };
        }
        let scale = 1.0 / width;
        Self {
            scale,
            bias: -a * scale,
        }
    }

    /// Apply the map.
    #[inline]
    pub fn apply(self, value: f64) -> f64 {
        value.mul_add(self.scale, self.bias)
    }

    /// Single-precision pair for shader uniforms.
    pub fn to_f32(self) -> [f32; 2] {
        [self.scale as f32, self.bias as f32]
    }
}

/// Texture encoding chosen for one component array.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureEncoding {
    scalar_type: ScalarType,
    format: TexelFormat,
    conversion: Conversion,
    type_scale: f64,
    ranges: Vec<[f64; 2]>,
    scale_bias: Vec<ScaleBias>,
}

impl TextureEncoding {
    /// Select the encoding for `array`.
    ///
    /// Fails for arrays with more components than a texel can hold.
    pub fn select(array: &ComponentArray) -> Result<Self> {
        array.check_texture_components()?;
        let scalar_type = array.scalar_type();
        let (kind, conversion, type_scale) = match scalar_type {
            ScalarType::U8 => (ChannelKind::Unorm8, Conversion::Direct, 1.0 / 255.0),
            ScalarType::I8 => (ChannelKind::Snorm8, Conversion::Direct, 1.0 / 127.0),
            ScalarType::U16 => (ChannelKind::Unorm16, Conversion::Direct, 1.0 / 65535.0),
            ScalarType::I16 => (ChannelKind::Snorm16, Conversion::Direct, 1.0 / 32767.0),
            ScalarType::F32 => (ChannelKind::Float32, Conversion::Direct, 1.0),
            ScalarType::U32
            | ScalarType::I32
            | ScalarType::U64
            | ScalarType::I64
            | ScalarType::F64 => (ChannelKind::Float32, Conversion::HostToFloat, 1.0),
        };
        let format = TexelFormat::new(kind, array.components() as u32)?;

        let ranges = array.ranges().to_vec();
        let mut encoding = Self {
            scalar_type,
            format,
            conversion,
            type_scale,
            ranges,
            scale_bias: Vec::new(),
        };
        encoding.scale_bias = match conversion {
            Conversion::Direct => encoding
                .ranges
                .iter()
                .map(|&[lo, hi]| {
                    ScaleBias::normalizing(encoding.raw_to_texel(lo), encoding.raw_to_texel(hi))
                })
                .collect(),
            Conversion::HostToFloat => vec![ScaleBias::IDENTITY; encoding.ranges.len()],
        };
        Ok(encoding)
    }

    /// Source element type.
    pub fn scalar_type(&self) -> ScalarType {
        self.scalar_type
    }

    /// Texel format of the volume texture.
    pub fn format(&self) -> TexelFormat {
        self.format
    }

    /// Whether data is uploaded directly or converted on the host.
    pub fn conversion(&self) -> Conversion {
        self.conversion
    }

    /// Number of components per texel.
    pub fn components(&self) -> usize {
        self.ranges.len()
    }

    /// Finite range of each component at selection time.
    pub fn ranges(&self) -> &[[f64; 2]] {
        &self.ranges
    }

    /// Published per-component map from sampled texel to `[0, 1]`.
    pub fn scale_bias(&self) -> &[ScaleBias] {
        &self.scale_bias
    }

    /// The value the sampler returns for a raw element.
    pub fn raw_to_texel(&self, raw: f64) -> f64 {
        match self.format.kind {
            ChannelKind::Snorm8 | ChannelKind::Snorm16 => (raw * self.type_scale).max(-1.0),
            _ => raw * self.type_scale,
        }
    }

    /// Host-side map used by [`Conversion::HostToFloat`] uploads.
    ///
    /// For direct encodings this is the identity; normalization happens in
    /// the shader through [`TextureEncoding::scale_bias`].
    pub fn host_scale_bias(&self, component: usize) -> ScaleBias {
        match (self.conversion, self.ranges.get(component)) {
            (Conversion::HostToFloat, Some(&[lo, hi])) => ScaleBias::normalizing(lo, hi),
            _ => ScaleBias::IDENTITY,
        }
    }

    /// Full path from a raw element to the normalized value the shader sees.
    pub fn raw_to_normalized(&self, component: usize, raw: f64) -> f64 {
        let texel = match self.conversion {
            Conversion::Direct => self.raw_to_texel(raw),
            Conversion::HostToFloat => self.host_scale_bias(component).apply(raw),
        };
        self.scale_bias
            .get(component)
            .copied()
            .unwrap_or(ScaleBias::IDENTITY)
            .apply(texel)
    }
}
