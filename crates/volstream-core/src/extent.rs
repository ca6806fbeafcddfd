//! Integer index-space extents.

use crate::error::{Error, Result};
use glam::{IVec3, UVec3};
use serde::{Deserialize, Serialize};

/// One of the three index axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    /// All axes, fastest-varying first.
    pub const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];

    /// Index into a 3-vector.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Closed index-space box: `min..=max` on every axis.
///
/// Equivalent to the six-value `[xmin, xmax, ymin, ymax, zmin, zmax]` form
/// used by image-data readers; see [`Extent::from_array`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    /// Inclusive lower corner
    pub min: IVec3,
    /// Inclusive upper corner
    pub max: IVec3,
}

impl Extent {
    /// Create an extent, validating `min <= max` per axis.
    pub fn new(min: IVec3, max: IVec3) -> Result<Self> {
        if min.cmpgt(max).any() {
            return Err(Error::InvalidExtent(format!("min {min} exceeds max {max}")));
        }
        Ok(Self { min, max })
    }

    /// Extent covering `dims` points starting at the origin.
    pub fn from_dims(dims: UVec3) -> Result<Self> {
        if dims.cmpeq(UVec3::ZERO).any() {
            return Err(Error::InvalidExtent(format!("zero dimension in {dims}")));
        }
        Self::new(IVec3::ZERO, dims.as_ivec3() - IVec3::ONE)
    }

    /// Create from `[xmin, xmax, ymin, ymax, zmin, zmax]`.
    pub fn from_array(e: [i32; 6]) -> Result<Self> {
        Self::new(IVec3::new(e[0], e[2], e[4]), IVec3::new(e[1], e[3], e[5]))
    }

    /// Convert to `[xmin, xmax, ymin, ymax, zmin, zmax]`.
    pub fn to_array(self) -> [i32; 6] {
        [
            self.min.x, self.max.x, self.min.y, self.max.y, self.min.z, self.max.z,
        ]
    }

    /// Number of points along each axis (`max - min + 1`).
    #[inline]
    pub fn point_dims(&self) -> UVec3 {
        (self.max - self.min + IVec3::ONE).as_uvec3()
    }

    /// Number of cells along each axis (`max - min`).
    ///
    /// A flat axis (single point layer) still holds one cell layer.
    #[inline]
    pub fn cell_dims(&self) -> UVec3 {
        (self.max - self.min).max(IVec3::ONE).as_uvec3()
    }

    /// Size along one axis, `max - min`.
    #[inline]
    pub fn size(&self, axis: Axis) -> u32 {
        let i = axis.index();
        (self.max[i] - self.min[i]) as u32
    }

    /// Whether `other` lies entirely inside this extent.
    pub fn contains(&self, other: &Self) -> bool {
        other.min.cmpge(self.min).all() && other.max.cmple(self.max).all()
    }

    /// Whether the index lies inside this extent.
    pub fn contains_index(&self, index: IVec3) -> bool {
        index.cmpge(self.min).all() && index.cmple(self.max).all()
    }

    /// Total number of points.
    pub fn point_count(&self) -> usize {
        let d = self.point_dims();
        d.x as usize * d.y as usize * d.z as usize
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        let d = self.cell_dims();
        d.x as usize * d.y as usize * d.z as usize
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.to_array();
        write!(f, "[{a}, {b}, {c}, {d}, {e}, {g}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_roundtrip() {
        let e = Extent::from_array([0, 9, -2, 5, 3, 3]).unwrap();
        assert_eq!(e.to_array(), [0, 9, -2, 5, 3, 3]);
        assert_eq!(e.point_dims(), UVec3::new(10, 8, 1));
    }

    #[test]
    fn flat_axis_has_one_cell_layer() {
        let e = Extent::from_array([0, 9, 0, 9, 0, 0]).unwrap();
        assert_eq!(e.cell_dims(), UVec3::new(9, 9, 1));
        assert_eq!(e.size(Axis::Z), 0);
    }

    #[test]
    fn rejects_inverted_extent() {
        assert!(Extent::from_array([5, 4, 0, 0, 0, 0]).is_err());
        assert!(Extent::from_dims(UVec3::new(4, 0, 4)).is_err());
    }

    #[test]
    fn containment() {
        let outer = Extent::from_array([0, 99, 0, 99, 0, 99]).unwrap();
        let inner = Extent::from_array([10, 50, 0, 99, 40, 41]).unwrap();
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains_index(IVec3::new(99, 0, 50)));
        assert!(!outer.contains_index(IVec3::new(100, 0, 50)));
    }
}
