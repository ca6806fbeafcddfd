//! In-memory texture device.
//!
//! Keeps texture contents in host memory and counts every allocation, probe
//! and upload so that streaming behavior can be checked without a GPU.

use crate::error::{GpuError, Result};
use crate::texture::{
    validate_upload, HostLayout, SamplerState, TextureDesc, TextureDevice, TextureHandle,
    TextureLimits, TextureRegion,
};
use hashbrown::HashMap;
use std::cell::Cell;

/// Counters accumulated by a [`HeadlessDevice`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub probes: u64,
    pub textures_created: u64,
    pub textures_destroyed: u64,
    pub uploads: u64,
    pub bytes_uploaded: u64,
    pub sampler_changes: u64,
    pub peak_bytes_resident: u64,
}

struct HeadlessTexture {
    desc: TextureDesc,
    sampler: SamplerState,
    texels: Vec<u8>,
}

/// Texture device backed by host memory.
pub struct HeadlessDevice {
    limits: TextureLimits,
    textures: HashMap<TextureHandle, HeadlessTexture>,
    next_handle: u32,
    bytes_resident: u64,
    stats: DeviceStats,
    probes: Cell<u64>,
    reject_probes: bool,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(TextureLimits::default())
    }
}

impl HeadlessDevice {
    /// Create a device reporting `limits`.
    pub fn new(limits: TextureLimits) -> Self {
        Self {
            limits,
            textures: HashMap::new(),
            next_handle: 1,
            bytes_resident: 0,
            stats: DeviceStats::default(),
            probes: Cell::new(0),
            reject_probes: false,
        }
    }

    /// Change the reported limits.
    pub fn set_limits(&mut self, limits: TextureLimits) {
        self.limits = limits;
    }

    /// Make every subsequent proxy check fail, as a driver without a
    /// matching format would.
    pub fn set_reject_probes(&mut self, reject: bool) {
        self.reject_probes = reject;
    }

    /// Accumulated counters.
    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            probes: self.probes.get(),
            ..self.stats
        }
    }

    /// Number of live textures.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Tightly packed contents of a live texture.
    pub fn texels(&self, texture: TextureHandle) -> Option<&[u8]> {
        self.textures.get(&texture).map(|t| t.texels.as_slice())
    }

    /// Current sampler of a live texture.
    pub fn sampler(&self, texture: TextureHandle) -> Option<SamplerState> {
        self.textures.get(&texture).map(|t| t.sampler)
    }

    fn texture_mut(&mut self, texture: TextureHandle) -> Result<&mut HeadlessTexture> {
        self.textures
            .get_mut(&texture)
            .ok_or(GpuError::UnknownTexture(texture.0))
    }
}

impl TextureDevice for HeadlessDevice {
    fn limits(&self) -> TextureLimits {
        self.limits
    }

    fn probe_texture(&self, desc: &TextureDesc) -> Result<()> {
        self.probes.set(self.probes.get() + 1);
        self.limits.check(desc)?;
        if self.reject_probes {
            return Err(GpuError::ProxyRejected {
                size: desc.size,
                format: desc.format.to_string(),
                reason: "format not supported".to_string(),
            });
        }
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle> {
        self.probe_texture(desc)?;
        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;

        let bytes = desc.byte_size();
        self.textures.insert(
            handle,
            HeadlessTexture {
                desc: desc.clone(),
                sampler: SamplerState::default(),
                texels: vec![0; bytes as usize],
            },
        );
        self.bytes_resident += bytes;
        self.stats.textures_created += 1;
        self.stats.peak_bytes_resident = self.stats.peak_bytes_resident.max(self.bytes_resident);
        Ok(handle)
    }

    fn upload(
        &mut self,
        texture: TextureHandle,
        region: &TextureRegion,
        layout: &HostLayout,
        data: &[u8],
    ) -> Result<()> {
        let target = self.texture_mut(texture)?;
        validate_upload(&target.desc, region, layout, data.len())?;

        let texel = target.desc.format.bytes_per_texel() as usize;
        let size = target.desc.size;
        let row_bytes = region.size.x as usize * texel;
        let mut copied = 0u64;
        for z in 0..region.size.z as usize {
            for y in 0..region.size.y as usize {
                let src = (z * layout.image_height as usize + y) * layout.row_length as usize * texel;
                let dz = region.offset.z as usize + z;
                let dy = region.offset.y as usize + y;
                let dst = ((dz * size.y as usize + dy) * size.x as usize
                    + region.offset.x as usize)
                    * texel;
                target.texels[dst..dst + row_bytes].copy_from_slice(&data[src..src + row_bytes]);
                copied += row_bytes as u64;
            }
        }

        self.stats.uploads += 1;
        self.stats.bytes_uploaded += copied;
        Ok(())
    }

    fn set_sampler(&mut self, texture: TextureHandle, sampler: SamplerState) -> Result<()> {
        self.texture_mut(texture)?.sampler = sampler;
        self.stats.sampler_changes += 1;
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureHandle) -> Result<()> {
        let removed = self
            .textures
            .remove(&texture)
            .ok_or(GpuError::UnknownTexture(texture.0))?;
        self.bytes_resident -= removed.desc.byte_size();
        self.stats.textures_destroyed += 1;
        Ok(())
    }

    fn texture_desc(&self, texture: TextureHandle) -> Option<&TextureDesc> {
        self.textures.get(&texture).map(|t| &t.desc)
    }

    fn bytes_resident(&self) -> u64 {
        self.bytes_resident
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{ChannelKind, Filter, TexelFormat};
    use glam::UVec3;

    fn r8() -> TexelFormat {
        TexelFormat::new(ChannelKind::Unorm8, 1).unwrap()
    }

    #[test]
    fn strided_upload_extracts_sub_box() {
        let mut device = HeadlessDevice::default();
        let desc = TextureDesc::volume("block", UVec3::splat(2), r8());
        let tex = device.create_texture(&desc).unwrap();

        // 4x4x4 host array holding its own linear index
        let host: Vec<u8> = (0..64).collect();
        // Block starting at (1, 2, 1)
        let start = (4 + 2) * 4 + 1;
        let layout = HostLayout {
            row_length: 4,
            image_height: 4,
        };
        device
            .upload(tex, &TextureRegion::whole(UVec3::splat(2)), &layout, &host[start..])
            .unwrap();

        assert_eq!(device.texels(tex).unwrap(), &[25, 26, 29, 30, 41, 42, 45, 46]);
        assert_eq!(device.stats().bytes_uploaded, 8);
    }

    #[test]
    fn residency_tracks_create_and_destroy() {
        let mut device = HeadlessDevice::default();
        let a = device
            .create_texture(&TextureDesc::volume("a", UVec3::splat(4), r8()))
            .unwrap();
        let b = device
            .create_texture(&TextureDesc::volume("b", UVec3::splat(2), r8()))
            .unwrap();
        assert_eq!(device.bytes_resident(), 72);
        device.destroy_texture(a).unwrap();
        assert_eq!(device.bytes_resident(), 8);
        assert_eq!(device.stats().peak_bytes_resident, 72);
        assert!(device.destroy_texture(a).is_err());
        device.destroy_texture(b).unwrap();
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn rejected_probe_prevents_allocation() {
        let mut device = HeadlessDevice::default();
        device.set_reject_probes(true);
        let result = device.create_texture(&TextureDesc::volume("a", UVec3::splat(4), r8()));
        assert!(matches!(result, Err(GpuError::ProxyRejected { .. })));
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn sampler_state_is_stored() {
        let mut device = HeadlessDevice::default();
        let tex = device
            .create_texture(&TextureDesc::table("lut", 16, 1, r8()))
            .unwrap();
        device
            .set_sampler(tex, SamplerState { filter: Filter::Nearest })
            .unwrap();
        assert_eq!(device.sampler(tex).unwrap().filter, Filter::Nearest);
    }
}
