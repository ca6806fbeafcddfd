//! Texture descriptors and the graphics-device seam.
//!
//! Everything above this crate talks to graphics memory through
//! [`TextureDevice`]. Handles are plain ids into an arena owned by the device;
//! whoever created a handle is responsible for destroying it.

use crate::error::{GpuError, Result};
use glam::UVec3;
use std::fmt;

/// Opaque id of a texture owned by a [`TextureDevice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

/// Storage class of one texel channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// 8-bit unsigned, sampled as `[0, 1]`
    Unorm8,
    /// 8-bit signed, sampled as `[-1, 1]`
    Snorm8,
    /// 16-bit unsigned, sampled as `[0, 1]`
    Unorm16,
    /// 16-bit signed, sampled as `[-1, 1]`
    Snorm16,
    /// 32-bit float, sampled unchanged
    Float32,
}

impl ChannelKind {
    /// Bytes per channel.
    pub const fn size_bytes(self) -> u32 {
        match self {
            Self::Unorm8 | Self::Snorm8 => 1,
            Self::Unorm16 | Self::Snorm16 => 2,
            Self::Float32 => 4,
        }
    }
}

/// Texel layout: channel kind times channel count (1..=4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TexelFormat {
    pub kind: ChannelKind,
    pub channels: u32,
}

impl TexelFormat {
    /// Create a format; channel count must be 1..=4.
    pub fn new(kind: ChannelKind, channels: u32) -> Result<Self> {
        if !(1..=4).contains(&channels) {
            return Err(GpuError::InvalidState(format!(
                "texel format needs 1..=4 channels, got {channels}"
            )));
        }
        Ok(Self { kind, channels })
    }

    /// Bytes per texel.
    pub const fn bytes_per_texel(self) -> u32 {
        self.kind.size_bytes() * self.channels
    }
}

impl fmt::Display for TexelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}x{}", self.kind, self.channels)
    }
}

/// Texture dimensionality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    /// Width x height, depth must be 1 (lookup tables)
    D2,
    /// Width x height x depth (volume blocks)
    D3,
}

/// Everything needed to allocate a texture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: String,
    pub dimension: TextureDimension,
    pub size: UVec3,
    pub format: TexelFormat,
}

impl TextureDesc {
    /// Describe a 3D texture.
    pub fn volume(label: impl Into<String>, size: UVec3, format: TexelFormat) -> Self {
        Self {
            label: label.into(),
            dimension: TextureDimension::D3,
            size,
            format,
        }
    }

    /// Describe a 2D texture of `width x height`.
    pub fn table(label: impl Into<String>, width: u32, height: u32, format: TexelFormat) -> Self {
        Self {
            label: label.into(),
            dimension: TextureDimension::D2,
            size: UVec3::new(width, height, 1),
            format,
        }
    }

    /// Bytes of graphics memory the texture occupies.
    pub fn byte_size(&self) -> u64 {
        u64::from(self.size.x)
            * u64::from(self.size.y)
            * u64::from(self.size.z)
            * u64::from(self.format.bytes_per_texel())
    }
}

/// Device capability limits, queried before every allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureLimits {
    /// Largest extent along any axis of a 3D texture
    pub max_texture_3d: u32,
    /// Largest width or height of a 2D texture
    pub max_texture_2d: u32,
}

impl Default for TextureLimits {
    fn default() -> Self {
        Self {
            max_texture_3d: 2048,
            max_texture_2d: 16384,
        }
    }
}

impl TextureLimits {
    /// Check a descriptor against the limits.
    pub fn check(&self, desc: &TextureDesc) -> Result<()> {
        if desc.size.cmpeq(UVec3::ZERO).any() {
            return Err(GpuError::InvalidState(format!(
                "texture '{}' has a zero dimension {}",
                desc.label, desc.size
            )));
        }
        let (max, fits) = match desc.dimension {
            TextureDimension::D3 => (self.max_texture_3d, desc.size.max_element() <= self.max_texture_3d),
            TextureDimension::D2 => (
                self.max_texture_2d,
                desc.size.x <= self.max_texture_2d
                    && desc.size.y <= self.max_texture_2d
                    && desc.size.z == 1,
            ),
        };
        if fits {
            Ok(())
        } else {
            Err(GpuError::ExceedsDeviceLimit {
                requested: desc.size,
                max,
            })
        }
    }
}

/// Texel sub-box of a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureRegion {
    pub offset: UVec3,
    pub size: UVec3,
}

impl TextureRegion {
    /// Region covering a whole texture of `size`.
    pub const fn whole(size: UVec3) -> Self {
        Self {
            offset: UVec3::ZERO,
            size,
        }
    }
}

/// Addressing of the host data for an upload, in texels.
///
/// `row_length` is the distance between consecutive rows and `image_height`
/// the number of rows between consecutive slices. Both are at least the
/// region's width/height; larger values let a block be read straight out of
/// the full volume array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostLayout {
    pub row_length: u32,
    pub image_height: u32,
}

impl HostLayout {
    /// Tightly packed layout for a region of `size`.
    pub const fn tight(size: UVec3) -> Self {
        Self {
            row_length: size.x,
            image_height: size.y,
        }
    }

    /// Bytes spanned by `size` texels laid out with this layout.
    pub fn span_bytes(&self, size: UVec3, bytes_per_texel: u32) -> usize {
        if size.cmpeq(UVec3::ZERO).any() {
            return 0;
        }
        let row = self.row_length as usize;
        let image = row * self.image_height as usize;
        let last = (size.z as usize - 1) * image + (size.y as usize - 1) * row + size.x as usize;
        last * bytes_per_texel as usize
    }
}

/// Texture magnification/minification filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

/// Sampler configuration. Addressing always clamps to edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SamplerState {
    pub filter: Filter,
}

/// Validate an upload against the texture it targets.
pub fn validate_upload(
    desc: &TextureDesc,
    region: &TextureRegion,
    layout: &HostLayout,
    data_len: usize,
) -> Result<()> {
    let end = region.offset + region.size;
    if end.cmpgt(desc.size).any() {
        return Err(GpuError::InvalidUpload(format!(
            "region {}+{} outside texture '{}' of size {}",
            region.offset, region.size, desc.label, desc.size
        )));
    }
    if layout.row_length < region.size.x || layout.image_height < region.size.y {
        return Err(GpuError::InvalidUpload(format!(
            "host layout {}x{} smaller than region {}",
            layout.row_length, layout.image_height, region.size
        )));
    }
    let needed = layout.span_bytes(region.size, desc.format.bytes_per_texel());
    if data_len < needed {
        return Err(GpuError::InvalidUpload(format!(
            "{data_len} bytes supplied, {needed} required"
        )));
    }
    Ok(())
}

/// A graphics device able to hold sampled textures.
///
/// All calls are synchronous: when `upload` returns, the data has been handed
/// to the driver and the host slice may be reused.
pub trait TextureDevice {
    /// Current capability limits.
    fn limits(&self) -> TextureLimits;

    /// Proxy allocation check: would `create_texture(desc)` succeed?
    ///
    /// Must not disturb any existing texture.
    fn probe_texture(&self, desc: &TextureDesc) -> Result<()>;

    /// Allocate a texture with undefined contents.
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle>;

    /// Copy host data into a region of a texture.
    ///
    /// `data` begins at the region's first texel and is addressed with
    /// `layout`.
    fn upload(
        &mut self,
        texture: TextureHandle,
        region: &TextureRegion,
        layout: &HostLayout,
        data: &[u8],
    ) -> Result<()>;

    /// Replace the sampler state of a texture.
    fn set_sampler(&mut self, texture: TextureHandle, sampler: SamplerState) -> Result<()>;

    /// Release a texture and its memory.
    fn destroy_texture(&mut self, texture: TextureHandle) -> Result<()>;

    /// Descriptor a live texture was created with.
    fn texture_desc(&self, texture: TextureHandle) -> Option<&TextureDesc>;

    /// Graphics memory currently held by live textures.
    fn bytes_resident(&self) -> u64;
}
