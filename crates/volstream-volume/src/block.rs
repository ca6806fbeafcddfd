//! Blocks and volume partitioning.
//!
//! Partitioning is pure bookkeeping: no voxel is touched, each block only
//! records where its samples start in the full component array.

use glam::{IVec3, UVec3, Vec3};
use volstream_core::{Aabb, Axis, Centering, Extent, Version};
use volstream_gpu::{HostLayout, TextureHandle};

use crate::error::{Result, StreamError};

/// One axis-aligned piece of a partitioned volume.
#[derive(Clone, Debug)]
pub struct Block {
    id: usize,
    extent: Extent,
    sample_origin: UVec3,
    texture_size: UVec3,
    tuple_offset: usize,
    bounds: Aabb,
    pub(crate) texture: Option<TextureHandle>,
    pub(crate) loaded_version: Version,
}

impl Block {
    /// Position in the partition, x fastest.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Point extent of the block in volume index space.
    ///
    /// Neighboring blocks share their boundary plane of points.
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// First sample of the block in the array's sample grid.
    pub fn sample_origin(&self) -> UVec3 {
        self.sample_origin
    }

    /// Texture size in texels; cell data holds one fewer sample per axis.
    pub fn texture_size(&self) -> UVec3 {
        self.texture_size
    }

    /// Index of the block's first tuple in the full component array.
    pub fn tuple_offset(&self) -> usize {
        self.tuple_offset
    }

    /// World-space bounds of the block's point extent.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Resident texture, if any.
    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    /// Data version of the last successful upload.
    pub fn loaded_version(&self) -> Version {
        self.loaded_version
    }

    /// Whether the texture holds data at least as new as `version`.
    pub fn is_current(&self, version: Version) -> bool {
        self.texture.is_some() && self.loaded_version >= version
    }

    /// Texture coordinates the ray may sample without reading past the data.
    ///
    /// Point samples sit at texel centers, so rays stay half a texel inside
    /// each face; cell samples fill the whole texture.
    pub fn texture_bounds(&self, centering: Centering) -> (Vec3, Vec3) {
        match centering {
            Centering::Point => {
                let n = self.texture_size.as_vec3();
                (Vec3::splat(0.5) / n, (n - 0.5) / n)
            }
            Centering::Cell => (Vec3::ZERO, Vec3::ONE),
        }
    }

    /// Texture-coordinate step between neighboring samples.
    pub fn cell_step(&self) -> Vec3 {
        Vec3::ONE / self.texture_size.as_vec3()
    }
}

/// Host addressing for reading any block out of an array with `sample_dims`.
pub fn host_layout(sample_dims: UVec3) -> HostLayout {
    HostLayout {
        row_length: sample_dims.x,
        image_height: sample_dims.y,
    }
}

/// Block boundaries along one axis: `count + 1` increasing point indices.
fn axis_boundaries(min: i32, max: i32, requested: u32) -> Vec<i32> {
    let cells = i64::from(max - min);
    let count = i64::from(requested).min(cells.max(1));
    (0..=count)
        .map(|i| min + ((i * cells) / count) as i32)
        .collect()
}

/// Split `extent` into at most `partitions` blocks per axis.
///
/// Counts larger than the number of cells along an axis are clamped so that
/// no block is empty. Blocks are returned in x-fastest order.
pub fn partition(
    extent: &Extent,
    partitions: UVec3,
    centering: Centering,
    origin: Vec3,
    spacing: Vec3,
) -> Result<Vec<Block>> {
    if partitions.cmpeq(UVec3::ZERO).any() {
        return Err(StreamError::InvalidPartitions(partitions));
    }
    let bounds: Vec<Vec<i32>> = Axis::ALL
        .iter()
        .map(|&axis| {
            let a = axis.index();
            axis_boundaries(extent.min[a], extent.max[a], partitions[a])
        })
        .collect();
    let sample_dims = centering.sample_dims(extent);

    let mut blocks = Vec::with_capacity(
        (bounds[0].len() - 1) * (bounds[1].len() - 1) * (bounds[2].len() - 1),
    );
    for z in bounds[2].windows(2) {
        for y in bounds[1].windows(2) {
            for x in bounds[0].windows(2) {
                let min = IVec3::new(x[0], y[0], z[0]);
                let max = IVec3::new(x[1], y[1], z[1]);
                let block_extent = Extent::new(min, max)?;
                let sample_origin = (min - extent.min).as_uvec3();
                let point_size = (max - min).as_uvec3();
                let texture_size = match centering {
                    Centering::Point => point_size + UVec3::ONE,
                    Centering::Cell => point_size.max(UVec3::ONE),
                };
                let tuple_offset = (sample_origin.z as usize * sample_dims.y as usize
                    + sample_origin.y as usize)
                    * sample_dims.x as usize
                    + sample_origin.x as usize;
                blocks.push(Block {
                    id: blocks.len(),
                    extent: block_extent,
                    sample_origin,
                    texture_size,
                    tuple_offset,
                    bounds: Aabb::from_extent(&block_extent, origin, spacing),
                    texture: None,
                    loaded_version: Version::NEVER,
                });
            }
        }
    }
    Ok(blocks)
}
