//! Math utilities and helpers.

use crate::extent::Extent;
use glam::{Mat4, Vec3};

/// Axis-Aligned Bounding Box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max corners
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB from two arbitrary opposite corners
    #[inline]
    pub fn from_corners(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// World-space box spanned by the points of `extent`.
    ///
    /// Negative spacing flips an axis; the corners are swapped so that
    /// `min <= max` always holds.
    pub fn from_extent(extent: &Extent, origin: Vec3, spacing: Vec3) -> Self {
        let lo = origin + extent.min.as_vec3() * spacing;
        let hi = origin + extent.max.as_vec3() * spacing;
        Self::from_corners(lo, hi)
    }

    /// Get the center of the AABB
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size of the AABB
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Check if a point is inside the AABB, widened by `tolerance` per axis
    #[inline]
    pub fn contains_point(&self, point: Vec3, tolerance: f32) -> bool {
        let t = Vec3::splat(tolerance);
        point.cmpge(self.min - t).all() && point.cmple(self.max + t).all()
    }

    /// Check if this AABB intersects another
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Merge two AABBs
    #[inline]
    pub fn merge(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Box enclosing this box after an affine transform.
    pub fn transform(&self, matrix: &Mat4) -> Aabb {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = matrix.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }
        Aabb { min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn aabb_contains_point() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(aabb.contains_point(Vec3::splat(0.5), 0.0));
        assert!(aabb.contains_point(Vec3::ZERO, 0.0));
        assert!(aabb.contains_point(Vec3::ONE, 0.0));
        assert!(!aabb.contains_point(Vec3::new(2.0, 0.5, 0.5), 0.0));
        assert!(aabb.contains_point(Vec3::new(1.05, 0.5, 0.5), 0.1));
    }

    #[test]
    fn extent_bounds_with_negative_spacing() {
        let extent = Extent::from_array([0, 10, 0, 4, 0, 2]).unwrap();
        let aabb = Aabb::from_extent(&extent, Vec3::ZERO, Vec3::new(-1.0, 2.0, 0.5));
        assert_eq!(aabb.min, Vec3::new(-10.0, 0.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(0.0, 8.0, 1.0));
    }

    #[test]
    fn transformed_box_encloses_rotation() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0));
        let rotated = aabb.transform(&Mat4::from_rotation_z(std::f32::consts::FRAC_PI_2));
        assert_relative_eq!(rotated.min.x, -1.0, epsilon = 1e-5);
        assert_relative_eq!(rotated.max.y, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn merge_and_intersect() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(0.5), Vec3::splat(2.0));
        let c = Aabb::new(Vec3::splat(3.0), Vec3::splat(4.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.merge(&c).max, Vec3::splat(4.0));
    }
}
