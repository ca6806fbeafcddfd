//! Synthetic volumes for tests and benchmarks.

use glam::{UVec3, Vec3};
use volstream_core::{Centering, ComponentArray, Extent, ScalarData, ScalarType, Volume};

use crate::Result;

/// Name of the array every generated volume carries.
pub const ARRAY: &str = "scalars";

/// Point-centered volume whose values rise linearly along +X from zero to
/// the top of the type's range (1.0 for floating point types).
pub fn ramp_volume(dims: UVec3, scalar_type: ScalarType) -> Result<Volume> {
    let extent = Extent::from_dims(dims)?;
    let last = dims.x.saturating_sub(1).max(1) as f64;
    let values = (0..extent.point_count())
        .map(|i| (i % dims.x as usize) as f64 / last)
        .collect::<Vec<_>>();
    let array = ComponentArray::new(ARRAY, typed(&values, scalar_type), 1, Centering::Point)?;
    Ok(Volume::new(extent, Vec3::ZERO, Vec3::ONE)?.with_array(array)?)
}

/// Point-centered volume holding `value` everywhere.
pub fn constant_volume(dims: UVec3, origin: Vec3, value: f32) -> Result<Volume> {
    let extent = Extent::from_dims(dims)?;
    let array = ComponentArray::new(
        ARRAY,
        ScalarData::F32(vec![value; extent.point_count()]),
        1,
        Centering::Point,
    )?;
    Ok(Volume::new(extent, origin, Vec3::ONE)?.with_array(array)?)
}

/// Cell-centered `f32` volume of distances from the center. Component `c`
/// holds the distance scaled by `c + 1`.
pub fn sphere_volume(dims: UVec3, components: usize) -> Result<Volume> {
    let extent = Extent::from_dims(dims + UVec3::ONE)?;
    let center = dims.as_vec3() * 0.5;
    let mut data = Vec::with_capacity(dims.x as usize * dims.y as usize * dims.z as usize * components);
    for z in 0..dims.z {
        for y in 0..dims.y {
            for x in 0..dims.x {
                let cell = Vec3::new(x as f32, y as f32, z as f32) + 0.5;
                let distance = cell.distance(center);
                data.extend((0..components).map(|c| distance * (c + 1) as f32));
            }
        }
    }
    let array = ComponentArray::new(ARRAY, ScalarData::F32(data), components, Centering::Cell)?;
    Ok(Volume::new(extent, Vec3::ZERO, Vec3::ONE)?.with_array(array)?)
}

/// Map unit values onto the integer range of `scalar_type`.
fn typed(values: &[f64], scalar_type: ScalarType) -> ScalarData {
    fn map<T>(values: &[f64], max: f64, cast: impl Fn(f64) -> T) -> Vec<T> {
        values.iter().map(|&v| cast((v * max).round())).collect()
    }
    match scalar_type {
        ScalarType::U8 => ScalarData::U8(map(values, 255.0, |v| v as u8)),
        ScalarType::I8 => ScalarData::I8(map(values, 127.0, |v| v as i8)),
        ScalarType::U16 => ScalarData::U16(map(values, 65535.0, |v| v as u16)),
        ScalarType::I16 => ScalarData::I16(map(values, 32767.0, |v| v as i16)),
        ScalarType::U32 => ScalarData::U32(map(values, 1e6, |v| v as u32)),
        ScalarType::I32 => ScalarData::I32(map(values, 1e6, |v| v as i32)),
        ScalarType::U64 => ScalarData::U64(map(values, 1e6, |v| v as u64)),
        ScalarType::I64 => ScalarData::I64(map(values, 1e6, |v| v as i64)),
        ScalarType::F32 => ScalarData::F32(values.iter().map(|&v| v as f32).collect()),
        ScalarType::F64 => ScalarData::F64(values.to_vec()),
    }
}
