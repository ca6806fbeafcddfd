//! Block loading and per-frame streaming.
//!
//! A single-block volume is uploaded once in [`VolumeStreamer::load_volume`]
//! and stays resident. A partitioned volume is streamed: every
//! [`VolumeStreamer::next_block`] call uploads the requested block into the
//! one texture the streamer keeps, replacing whatever the previous block left
//! there, so graphics memory never holds more than one block.

use glam::UVec3;
use rayon::prelude::*;
use volstream_core::{Aabb, Centering, ComponentArray, Extent, ScalarData, Version, Volume};
use volstream_gpu::{
    Filter, HostLayout, SamplerState, TextureDesc, TextureDevice, TextureHandle, TextureRegion,
};

use crate::block::{host_layout, partition, Block};
use crate::error::{Result, StreamError};
use crate::format::{Conversion, ScaleBias, TextureEncoding};

/// What was loaded, used to validate later streaming calls.
#[derive(Clone, Debug)]
struct LoadedSource {
    array: String,
    extent: Extent,
    centering: Centering,
    sample_dims: UVec3,
    bounds: Aabb,
}

/// Partitions a volume into blocks and feeds their textures to the renderer.
pub struct VolumeStreamer {
    partitions: UVec3,
    filter: Filter,
    blocks: Vec<Block>,
    encoding: Option<TextureEncoding>,
    source: Option<LoadedSource>,
    streaming: bool,
    order: Vec<usize>,
    cursor: usize,
    resident: Option<usize>,
    slice: Vec<f32>,
}

impl Default for VolumeStreamer {
    fn default() -> Self {
        Self {
            partitions: UVec3::ONE,
            filter: Filter::Linear,
            blocks: Vec::new(),
            encoding: None,
            source: None,
            streaming: false,
            order: Vec::new(),
            cursor: 0,
            resident: None,
            slice: Vec::new(),
        }
    }
}

impl VolumeStreamer {
    /// Create a streamer splitting volumes into `partitions` blocks per axis.
    pub fn new(partitions: UVec3) -> Result<Self> {
        let mut streamer = Self::default();
        streamer.set_partitions(partitions)?;
        Ok(streamer)
    }

    /// Requested block counts per axis; applied by the next load.
    pub fn partitions(&self) -> UVec3 {
        self.partitions
    }

    /// Change the requested block counts. Takes effect on the next
    /// [`VolumeStreamer::load_volume`].
    pub fn set_partitions(&mut self, partitions: UVec3) -> Result<()> {
        if partitions.cmpeq(UVec3::ZERO).any() {
            return Err(StreamError::InvalidPartitions(partitions));
        }
        self.partitions = partitions;
        Ok(())
    }

    /// Split `volume` into blocks for the array named `array`.
    ///
    /// Any previously loaded blocks and their textures are released first.
    /// A single block is uploaded immediately; partitioned volumes enter
    /// streaming mode and load lazily through [`VolumeStreamer::next_block`].
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn load_volume(
        &mut self,
        device: &mut dyn TextureDevice,
        volume: &Volume,
        array: &str,
        filter: Filter,
    ) -> Result<()> {
        self.release_graphics_resources(device)?;
        self.blocks.clear();
        self.encoding = None;
        self.source = None;

        let component_array = volume.array(array)?;
        let encoding = TextureEncoding::select(component_array)?;
        let centering = component_array.centering();
        let extent = volume.extent();
        let blocks = partition(
            &extent,
            self.partitions,
            centering,
            volume.origin(),
            volume.spacing(),
        )?;

        self.filter = filter;
        self.streaming = blocks.len() > 1;
        self.order = (0..blocks.len()).collect();
        self.cursor = 0;
        self.blocks = blocks;
        self.source = Some(LoadedSource {
            array: array.to_string(),
            extent,
            centering,
            sample_dims: centering.sample_dims(&extent),
            bounds: volume.bounds(),
        });

        tracing::info!(
            "Loaded '{}' {} ({} x{}) as {} block(s){}",
            array,
            extent,
            encoding.scalar_type().name(),
            encoding.components(),
            self.blocks.len(),
            if self.streaming { ", streaming" } else { "" }
        );
        self.encoding = Some(encoding);

        if !self.streaming {
            self.load_resident(device, volume, 0)?;
        }
        Ok(())
    }

    /// Set the order in which [`VolumeStreamer::next_block`] returns blocks,
    /// restarting iteration. `order` must be a permutation of block ids.
    pub fn set_block_order(&mut self, order: &[usize]) -> Result<()> {
        let n = self.blocks.len();
        let mut seen = vec![false; n];
        let valid = order.len() == n
            && order
                .iter()
                .all(|&i| i < n && !std::mem::replace(&mut seen[i], true));
        if !valid {
            return Err(StreamError::InvalidOrder(order.to_vec(), n));
        }
        self.order.clear();
        self.order.extend_from_slice(order);
        self.cursor = 0;
        Ok(())
    }

    /// Current block order.
    pub fn block_order(&self) -> &[usize] {
        &self.order
    }

    /// Return the next block of the frame with its texture loaded.
    ///
    /// Returns `Ok(None)` once every block has been returned and rewinds, so
    /// the next call starts a new frame. On error the failing block is
    /// skipped; calling again continues with the following block.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn next_block(
        &mut self,
        device: &mut dyn TextureDevice,
        volume: &Volume,
    ) -> Result<Option<&Block>> {
        self.check_source(volume)?;

        let Some(&index) = self.order.get(self.cursor) else {
            self.cursor = 0;
            if self.streaming {
                self.evict(device)?;
            }
            return Ok(None);
        };
        self.cursor += 1;

        if self.streaming {
            self.stream_in(device, volume, index)?;
        } else if !self.blocks[index].is_current(volume.data_version()) {
            self.load_resident(device, volume, index)?;
        }
        Ok(Some(&self.blocks[index]))
    }

    /// Change the sampling filter of every resident block texture without
    /// re-uploading voxel data.
    pub fn set_interpolation(&mut self, device: &mut dyn TextureDevice, filter: Filter) -> Result<()> {
        if filter == self.filter {
            return Ok(());
        }
        self.filter = filter;
        for texture in self.blocks.iter().filter_map(Block::texture) {
            device.set_sampler(texture, SamplerState { filter })?;
        }
        Ok(())
    }

    /// Current sampling filter.
    pub fn interpolation(&self) -> Filter {
        self.filter
    }

    /// Destroy every block texture. Blocks stay partitioned and reload on
    /// their next use.
    pub fn release_graphics_resources(&mut self, device: &mut dyn TextureDevice) -> Result<()> {
        let mut released = 0;
        for block in &mut self.blocks {
            if let Some(texture) = block.texture.take() {
                device.destroy_texture(texture)?;
                released += 1;
            }
            block.loaded_version = Version::NEVER;
        }
        self.resident = None;
        self.cursor = 0;
        if released > 0 {
            tracing::info!("Released {} block texture(s)", released);
        }
        Ok(())
    }

    /// All blocks of the loaded volume.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Encoding of the loaded array.
    pub fn encoding(&self) -> Option<&TextureEncoding> {
        self.encoding.as_ref()
    }

    /// Published per-component scale/bias of the loaded array.
    pub fn scale_bias(&self) -> &[ScaleBias] {
        match &self.encoding {
            Some(encoding) => encoding.scale_bias(),
            None => &[],
        }
    }

    /// Whether blocks are streamed one at a time.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Whether a volume is loaded.
    pub fn is_loaded(&self) -> bool {
        self.source.is_some()
    }

    /// Name of the loaded array.
    pub fn array_name(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.array.as_str())
    }

    /// Centering of the loaded array.
    pub fn centering(&self) -> Option<Centering> {
        self.source.as_ref().map(|s| s.centering)
    }

    /// Index-space extent of the loaded volume.
    pub fn loaded_extent(&self) -> Option<Extent> {
        self.source.as_ref().map(|s| s.extent)
    }

    /// World-space bounds of the loaded extent.
    pub fn loaded_bounds(&self) -> Option<Aabb> {
        self.source.as_ref().map(|s| s.bounds)
    }

    /// Block whose data currently occupies the streaming texture.
    pub fn resident_block(&self) -> Option<usize> {
        self.resident
    }

    fn check_source(&self, volume: &Volume) -> Result<()> {
        let source = self.source.as_ref().ok_or(StreamError::NotLoaded)?;
        if volume.extent() != source.extent {
            return Err(StreamError::VolumeMismatch(format!(
                "extent {} differs from loaded {}",
                volume.extent(),
                source.extent
            )));
        }
        let array = volume.array(&source.array)?;
        if array.centering() != source.centering {
            return Err(StreamError::VolumeMismatch(format!(
                "array '{}' changed centering",
                source.array
            )));
        }
        if let Some(encoding) = &self.encoding {
            if array.scalar_type() != encoding.scalar_type()
                || array.components() != encoding.components()
                || array.ranges() != encoding.ranges()
            {
                return Err(StreamError::VolumeMismatch(format!(
                    "array '{}' is now {} x{}, loaded as {} x{}",
                    source.array,
                    array.scalar_type().name(),
                    array.components(),
                    encoding.scalar_type().name(),
                    encoding.components()
                )));
            }
        }
        Ok(())
    }

    fn block_desc(&self, index: usize) -> Result<TextureDesc> {
        let encoding = self.encoding.as_ref().ok_or(StreamError::NotLoaded)?;
        Ok(TextureDesc::volume(
            format!("block {index}"),
            self.blocks[index].texture_size(),
            encoding.format(),
        ))
    }

    /// Limits first, then the proxy check. Nothing resident is touched.
    fn check_capability(device: &dyn TextureDevice, desc: &TextureDesc) -> Result<()> {
        let checked = device
            .limits()
            .check(desc)
            .and_then(|()| device.probe_texture(desc));
        if let Err(e) = checked {
            tracing::warn!("Cannot allocate {} ({}): {}", desc.label, desc.size, e);
            return Err(e.into());
        }
        Ok(())
    }

    fn create_texture(&self, device: &mut dyn TextureDevice, desc: &TextureDesc) -> Result<TextureHandle> {
        let texture = device.create_texture(desc)?;
        device.set_sampler(texture, SamplerState { filter: self.filter })?;
        Ok(texture)
    }

    fn texture_fits(device: &dyn TextureDevice, texture: TextureHandle, desc: &TextureDesc) -> bool {
        device
            .texture_desc(texture)
            .is_some_and(|d| d.size == desc.size && d.format == desc.format)
    }

    /// Upload a block that keeps its own texture (single-block mode).
    fn load_resident(&mut self, device: &mut dyn TextureDevice, volume: &Volume, index: usize) -> Result<()> {
        let desc = self.block_desc(index)?;
        let texture = match self.blocks[index].texture {
            Some(t) if Self::texture_fits(device, t, &desc) => t,
            existing => {
                Self::check_capability(device, &desc)?;
                if let Some(old) = existing {
                    self.blocks[index].texture = None;
                    device.destroy_texture(old)?;
                }
                let texture = self.create_texture(device, &desc)?;
                self.blocks[index].texture = Some(texture);
                texture
            }
        };
        self.upload(device, volume, index, texture)
    }

    /// Upload a block into the shared streaming texture.
    fn stream_in(&mut self, device: &mut dyn TextureDevice, volume: &Volume, index: usize) -> Result<()> {
        let desc = self.block_desc(index)?;
        let previous = self.resident.and_then(|i| self.blocks[i].texture);
        let reusable = previous.filter(|&t| Self::texture_fits(device, t, &desc));
        if reusable.is_none() {
            Self::check_capability(device, &desc)?;
        }

        if let Some(i) = self.resident.take() {
            self.blocks[i].texture = None;
            self.blocks[i].loaded_version = Version::NEVER;
        }
        let texture = match (reusable, previous) {
            (Some(t), _) => t,
            (None, Some(old)) => {
                device.destroy_texture(old)?;
                self.create_texture(device, &desc)?
            }
            (None, None) => self.create_texture(device, &desc)?,
        };
        self.blocks[index].texture = Some(texture);
        self.resident = Some(index);
        self.upload(device, volume, index, texture)
    }

    /// Release the streaming texture at the end of a frame.
    fn evict(&mut self, device: &mut dyn TextureDevice) -> Result<()> {
        if let Some(i) = self.resident.take() {
            self.blocks[i].loaded_version = Version::NEVER;
            if let Some(texture) = self.blocks[i].texture.take() {
                device.destroy_texture(texture)?;
            }
        }
        Ok(())
    }

    fn upload(
        &mut self,
        device: &mut dyn TextureDevice,
        volume: &Volume,
        index: usize,
        texture: TextureHandle,
    ) -> Result<()> {
        let (Some(encoding), Some(source)) = (self.encoding.as_ref(), self.source.as_ref()) else {
            return Err(StreamError::NotLoaded);
        };
        let array = volume.array(&source.array)?;
        self.blocks[index].loaded_version = Version::NEVER;
        let block = &self.blocks[index];

        match encoding.conversion() {
            Conversion::Direct => {
                let texel = encoding.format().bytes_per_texel() as usize;
                let start = block.tuple_offset() * texel;
                device.upload(
                    texture,
                    &TextureRegion::whole(block.texture_size()),
                    &host_layout(source.sample_dims),
                    &array.data().as_bytes()[start..],
                )?;
            }
            Conversion::HostToFloat => {
                upload_slices(
                    device,
                    texture,
                    array,
                    encoding,
                    block,
                    source.sample_dims,
                    &mut self.slice,
                )?;
            }
        }

        tracing::debug!(
            "Uploaded block {} {} ({} texels)",
            index,
            block.extent(),
            block.texture_size()
        );
        self.blocks[index].loaded_version = volume.data_version();
        Ok(())
    }
}

/// Convert a block to normalized `f32` one z-slice at a time.
///
/// Host memory is bounded by a single slice of the block.
fn upload_slices(
    device: &mut dyn TextureDevice,
    texture: TextureHandle,
    array: &ComponentArray,
    encoding: &TextureEncoding,
    block: &Block,
    sample_dims: UVec3,
    slice: &mut Vec<f32>,
) -> Result<()> {
    let components = encoding.components();
    let size = block.texture_size();
    let row_len = size.x as usize * components;
    let maps: Vec<ScaleBias> = (0..components).map(|c| encoding.host_scale_bias(c)).collect();
    let data: &ScalarData = array.data();
    let row_stride = sample_dims.x as usize;
    let slice_stride = row_stride * sample_dims.y as usize;

    slice.clear();
    slice.resize(row_len * size.y as usize, 0.0);
    let region_size = UVec3::new(size.x, size.y, 1);

    for z in 0..size.z {
        let first_tuple = block.tuple_offset() + z as usize * slice_stride;
        slice
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each_init(
                || vec![0.0f64; row_len],
                |raw, (y, row)| {
                    data.read_f64((first_tuple + y * row_stride) * components, raw);
                    for (i, (dst, &value)) in row.iter_mut().zip(raw.iter()).enumerate() {
                        *dst = maps[i % components].apply(value) as f32;
                    }
                },
            );
        device.upload(
            texture,
            &TextureRegion {
                offset: UVec3::new(0, 0, z),
                size: region_size,
            },
            &HostLayout::tight(region_size),
            bytemuck::cast_slice(slice.as_slice()),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use volstream_gpu::{GpuError, HeadlessDevice, TextureLimits};

    fn ramp_volume(dims: UVec3, data: impl Fn(usize) -> f32) -> Volume {
        let n = (dims.x * dims.y * dims.z) as usize;
        let values = (0..n).map(data).collect();
        Volume::new(Extent::from_dims(dims).unwrap(), glam::Vec3::ZERO, glam::Vec3::ONE)
            .unwrap()
            .with_array(
                ComponentArray::new("s", ScalarData::F32(values), 1, Centering::Point).unwrap(),
            )
            .unwrap()
    }

    fn drain(streamer: &mut VolumeStreamer, device: &mut HeadlessDevice, volume: &Volume) -> Vec<usize> {
        let mut ids = Vec::new();
        while let Some(block) = streamer.next_block(device, volume).unwrap() {
            ids.push(block.id());
        }
        ids
    }

    #[test]
    fn single_block_loads_immediately() {
        let mut device = HeadlessDevice::default();
        let volume = ramp_volume(UVec3::splat(8), |i| i as f32);
        let mut streamer = VolumeStreamer::default();
        streamer
            .load_volume(&mut device, &volume, "s", Filter::Linear)
            .unwrap();
        assert!(!streamer.is_streaming());
        assert_eq!(device.stats().uploads, 1);
        assert!(streamer.blocks()[0].texture().is_some());

        // Iterating does not upload again, and the texture stays resident
        assert_eq!(drain(&mut streamer, &mut device, &volume), vec![0]);
        assert_eq!(device.stats().uploads, 1);
        assert_eq!(device.live_textures(), 1);
    }

    #[test]
    fn single_block_reloads_after_modification() {
        let mut device = HeadlessDevice::default();
        let mut volume = ramp_volume(UVec3::splat(4), |i| i as f32);
        let mut streamer = VolumeStreamer::default();
        streamer
            .load_volume(&mut device, &volume, "s", Filter::Linear)
            .unwrap();
        volume.mark_modified();
        drain(&mut streamer, &mut device, &volume);
        assert_eq!(device.stats().uploads, 2);
        assert_eq!(device.stats().textures_created, 1);
    }

    #[test]
    fn streaming_keeps_one_block_resident() {
        let mut device = HeadlessDevice::default();
        let volume = ramp_volume(UVec3::new(9, 5, 5), |i| i as f32);
        let mut streamer = VolumeStreamer::new(UVec3::new(2, 2, 1)).unwrap();
        streamer
            .load_volume(&mut device, &volume, "s", Filter::Linear)
            .unwrap();
        assert!(streamer.is_streaming());
        assert_eq!(device.stats().uploads, 0);

        let block_bytes = 5 * 3 * 5 * 4;
        for _ in 0..3 {
            assert_eq!(drain(&mut streamer, &mut device, &volume), vec![0, 1, 2, 3]);
            assert_eq!(device.live_textures(), 0);
        }
        assert_eq!(device.stats().uploads, 12);
        assert_eq!(device.stats().peak_bytes_resident, block_bytes);
        // Equal-sized blocks share one allocation per frame
        assert_eq!(device.stats().textures_created, 3);
    }

    #[test]
    fn streamed_texture_holds_block_data() {
        let mut device = HeadlessDevice::default();
        let volume = ramp_volume(UVec3::new(4, 2, 2), |i| i as f32);
        let mut streamer = VolumeStreamer::new(UVec3::new(2, 1, 1)).unwrap();
        streamer
            .load_volume(&mut device, &volume, "s", Filter::Linear)
            .unwrap();
        streamer.set_block_order(&[1, 0]).unwrap();
        let block = streamer.next_block(&mut device, &volume).unwrap().unwrap();
        assert_eq!(block.id(), 1);
        let texture = block.texture().unwrap();
        // Block 1 covers x in [1, 3] including the shared plane x = 1
        let texels: &[f32] = bytemuck::cast_slice(device.texels(texture).unwrap());
        assert_eq!(
            texels,
            &[1.0, 2.0, 3.0, 5.0, 6.0, 7.0, 9.0, 10.0, 11.0, 13.0, 14.0, 15.0]
        );
    }

    #[test]
    fn oversized_block_fails_without_touching_resident() {
        let mut device = HeadlessDevice::new(TextureLimits {
            max_texture_3d: 4,
            max_texture_2d: 1024,
        });
        // Both blocks are 5x4x4
        let volume = ramp_volume(UVec3::new(9, 4, 4), |i| i as f32);
        let mut streamer = VolumeStreamer::new(UVec3::new(2, 1, 1)).unwrap();
        streamer
            .load_volume(&mut device, &volume, "s", Filter::Linear)
            .unwrap();
        assert_eq!(streamer.blocks()[0].texture_size(), UVec3::new(5, 4, 4));

        let err = streamer.next_block(&mut device, &volume).unwrap_err();
        assert!(err.is_capability_failure());
        assert!(matches!(
            err,
            StreamError::Gpu(GpuError::ExceedsDeviceLimit { max: 4, .. })
        ));
        // The failing block is skipped, the frame can still finish
        assert!(streamer.next_block(&mut device, &volume).is_err());
        assert!(streamer.next_block(&mut device, &volume).unwrap().is_none());
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn rejected_probe_is_reported() {
        let mut device = HeadlessDevice::default();
        device.set_reject_probes(true);
        let volume = ramp_volume(UVec3::splat(4), |i| i as f32);
        let mut streamer = VolumeStreamer::default();
        let err = streamer
            .load_volume(&mut device, &volume, "s", Filter::Linear)
            .unwrap_err();
        assert!(err.is_capability_failure());
        assert_eq!(device.stats().textures_created, 0);
    }

    #[test]
    fn f64_data_is_normalized_on_host_per_slice() {
        let dims = UVec3::new(3, 2, 4);
        let values: Vec<f64> = (0..24).map(|i| 10.0 + f64::from(i)).collect();
        let volume = Volume::new(Extent::from_dims(dims).unwrap(), glam::Vec3::ZERO, glam::Vec3::ONE)
            .unwrap()
            .with_array(
                ComponentArray::new("d", ScalarData::F64(values), 1, Centering::Point).unwrap(),
            )
            .unwrap();
        let mut device = HeadlessDevice::default();
        let mut streamer = VolumeStreamer::default();
        streamer
            .load_volume(&mut device, &volume, "d", Filter::Linear)
            .unwrap();

        // One upload per z-slice
        assert_eq!(device.stats().uploads, 4);
        let texture = streamer.blocks()[0].texture().unwrap();
        let texels: &[f32] = bytemuck::cast_slice(device.texels(texture).unwrap());
        approx::assert_abs_diff_eq!(texels[0], 0.0, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(texels[23], 1.0, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(texels[11], 11.0 / 23.0, epsilon = 1e-6);
    }

    #[test]
    fn cell_data_streams_one_fewer_sample() {
        let dims = UVec3::new(5, 3, 3);
        let cells = (4 * 2 * 2) as usize;
        let volume = Volume::new(Extent::from_dims(dims).unwrap(), glam::Vec3::ZERO, glam::Vec3::ONE)
            .unwrap()
            .with_array(
                ComponentArray::new("c", ScalarData::U8((0..cells as u8).collect()), 1, Centering::Cell)
                    .unwrap(),
            )
            .unwrap();
        let mut device = HeadlessDevice::default();
        let mut streamer = VolumeStreamer::new(UVec3::new(2, 1, 1)).unwrap();
        streamer
            .load_volume(&mut device, &volume, "c", Filter::Nearest)
            .unwrap();
        let block = streamer.next_block(&mut device, &volume).unwrap().unwrap();
        assert_eq!(block.texture_size(), UVec3::new(2, 2, 2));
        let texels = device.texels(block.texture().unwrap()).unwrap();
        assert_eq!(texels, &[0, 1, 4, 5, 8, 9, 12, 13]);
    }

    #[test]
    fn interpolation_change_skips_upload() {
        let mut device = HeadlessDevice::default();
        let volume = ramp_volume(UVec3::splat(4), |i| i as f32);
        let mut streamer = VolumeStreamer::default();
        streamer
            .load_volume(&mut device, &volume, "s", Filter::Linear)
            .unwrap();
        streamer
            .set_interpolation(&mut device, Filter::Nearest)
            .unwrap();
        let texture = streamer.blocks()[0].texture().unwrap();
        assert_eq!(device.sampler(texture).unwrap().filter, Filter::Nearest);
        assert_eq!(device.stats().uploads, 1);
    }

    #[test]
    fn release_then_next_frame_reloads() {
        let mut device = HeadlessDevice::default();
        let volume = ramp_volume(UVec3::splat(4), |i| i as f32);
        let mut streamer = VolumeStreamer::default();
        streamer
            .load_volume(&mut device, &volume, "s", Filter::Linear)
            .unwrap();
        streamer.release_graphics_resources(&mut device).unwrap();
        assert_eq!(device.live_textures(), 0);
        drain(&mut streamer, &mut device, &volume);
        assert_eq!(device.live_textures(), 1);
        assert_eq!(device.stats().uploads, 2);
    }

    #[test]
    fn order_must_be_a_permutation() {
        let mut device = HeadlessDevice::default();
        let volume = ramp_volume(UVec3::splat(6), |i| i as f32);
        let mut streamer = VolumeStreamer::new(UVec3::new(3, 1, 1)).unwrap();
        streamer
            .load_volume(&mut device, &volume, "s", Filter::Linear)
            .unwrap();
        assert!(streamer.set_block_order(&[0, 1]).is_err());
        assert!(streamer.set_block_order(&[0, 1, 1]).is_err());
        assert!(streamer.set_block_order(&[2, 0, 1]).is_ok());
        assert_eq!(drain(&mut streamer, &mut device, &volume), vec![2, 0, 1]);
    }

    #[test]
    fn replaced_array_must_be_reloaded() {
        let mut device = HeadlessDevice::default();
        let extent = Extent::from_dims(UVec3::splat(4)).unwrap();
        let bytes =
            ComponentArray::new("s", ScalarData::U8((0..64).collect()), 1, Centering::Point)
                .unwrap();
        let mut volume = Volume::new(extent, glam::Vec3::ZERO, glam::Vec3::ONE)
            .unwrap()
            .with_array(bytes)
            .unwrap();
        let mut streamer = VolumeStreamer::default();
        streamer
            .load_volume(&mut device, &volume, "s", Filter::Linear)
            .unwrap();
        assert_eq!(device.stats().uploads, 1);

        let floats =
            ComponentArray::new("s", ScalarData::F32(vec![1.0; 64]), 1, Centering::Point)
                .unwrap();
        volume.set_array(floats).unwrap();
        assert!(matches!(
            streamer.next_block(&mut device, &volume),
            Err(StreamError::VolumeMismatch(_))
        ));
        assert_eq!(device.stats().uploads, 1);

        // Reloading picks up the new encoding
        streamer
            .load_volume(&mut device, &volume, "s", Filter::Linear)
            .unwrap();
        assert_eq!(
            streamer.encoding().unwrap().scalar_type(),
            volstream_core::ScalarType::F32
        );
        assert_eq!(drain(&mut streamer, &mut device, &volume), vec![0]);
    }

    #[test]
    fn streaming_before_load_fails() {
        let mut device = HeadlessDevice::default();
        let volume = ramp_volume(UVec3::splat(2), |i| i as f32);
        let mut streamer = VolumeStreamer::default();
        assert!(matches!(
            streamer.next_block(&mut device, &volume),
            Err(StreamError::NotLoaded)
        ));
    }
}
