//! Back-to-front ordering of axis-aligned render units.
//!
//! "Is A in front of B" is only a partial order for boxes: it is decided for
//! boxes that touch along one axis and left unknown for everything else. A
//! global order is extracted by repeatedly taking a unit nothing else is in
//! front of. Constraint cycles, possible with interpenetrating boxes, are
//! broken by taking the unit with the fewest units in front of it, so every
//! call returns a full permutation.

use std::cmp::Ordering;

use glam::{Mat4, Vec3};
use volstream_core::{Aabb, Axis};
use volstream_volume::Block;

use crate::camera::Camera;

/// Facing faces further apart than this fraction of the center distance are
/// not adjacent.
const ADJACENCY_TOLERANCE: f32 = 0.01;

/// Anything with world bounds that is drawn as one piece.
pub trait RenderUnit {
    /// Bounds in the frame the sort view is expressed in.
    fn bounds(&self) -> Aabb;
}

impl RenderUnit for Aabb {
    fn bounds(&self) -> Aabb {
        *self
    }
}

impl RenderUnit for Block {
    fn bounds(&self) -> Aabb {
        Block::bounds(self)
    }
}

impl<T: RenderUnit + ?Sized> RenderUnit for &T {
    fn bounds(&self) -> Aabb {
        (**self).bounds()
    }
}

/// Camera state in the units' local frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SortView {
    /// Ordering depends on the eye position.
    Perspective { position: Vec3 },
    /// Ordering depends only on the view direction.
    Parallel { direction: Vec3 },
}

impl SortView {
    /// Express `camera` in the local frame of units placed by `model`.
    pub fn from_camera(camera: &Camera, model: &Mat4) -> Self {
        let to_local = model.inverse();
        if camera.is_parallel() {
            Self::Parallel {
                direction: to_local
                    .transform_vector3(camera.direction())
                    .normalize_or(camera.direction()),
            }
        } else {
            Self::Perspective {
                position: to_local.transform_point3(camera.position()),
            }
        }
    }

    /// Signed component along `axis` of the viewing ray that reaches the
    /// plane `axis = plane`.
    fn toward(&self, axis: usize, plane: f32) -> f32 {
        match *self {
            Self::Perspective { position } => plane - position[axis],
            Self::Parallel { direction } => direction[axis],
        }
    }
}

/// Per-axis overlap of two boxes; negative values are gaps.
fn overlaps(a: &Aabb, b: &Aabb) -> Vec3 {
    a.max.min(b.max) - a.min.max(b.min)
}

/// Relative depth of two boxes.
///
/// `Less` means `a` is in front of `b` (closer to the camera), `Greater` the
/// opposite, and `None` that drawing them in either order is acceptable.
/// The result is antisymmetric in its arguments.
pub fn compare(a: &Aabb, b: &Aabb, view: &SortView) -> Option<Ordering> {
    let delta = b.center() - a.center();
    let distance = delta.length();
    if distance <= f32::EPSILON {
        return None;
    }

    let overlap = overlaps(a, b);
    let axis = Axis::ALL
        .iter()
        .map(|axis| axis.index())
        .min_by(|&i, &j| overlap[i].total_cmp(&overlap[j]))
        .unwrap_or(0);

    // Non-adjacent boxes impose no constraint
    if -overlap[axis] > ADJACENCY_TOLERANCE * distance {
        return None;
    }

    if delta[axis] == 0.0 {
        return None;
    }
    let sign = delta[axis].signum();
    let plane = if sign > 0.0 {
        (a.max[axis] + b.min[axis]) * 0.5
    } else {
        (a.min[axis] + b.max[axis]) * 0.5
    };

    let facing = view.toward(axis, plane) * sign;
    if facing > 0.0 {
        Some(Ordering::Less)
    } else if facing < 0.0 {
        Some(Ordering::Greater)
    } else {
        None
    }
}

/// Order `units` for back-to-front compositing.
///
/// Returns a permutation of `0..units.len()`, farthest unit first.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub fn sort_back_to_front<U: RenderUnit>(units: &[U], view: &SortView) -> Vec<usize> {
    let bounds: Vec<Aabb> = units.iter().map(|unit| unit.bounds()).collect();
    let n = bounds.len();
    let mut in_front = vec![false; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            match compare(&bounds[i], &bounds[j], view) {
                Some(Ordering::Less) => in_front[i * n + j] = true,
                Some(Ordering::Greater) => in_front[j * n + i] = true,
                _ => {}
            }
        }
    }
    let mut order = front_to_back(n, |i, j| in_front[i * n + j]);
    order.reverse();
    order
}

/// Front-to-back extraction from an "i is in front of j" relation.
fn front_to_back(n: usize, in_front: impl Fn(usize, usize) -> bool) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..n).collect();
    let mut order = Vec::with_capacity(n);
    let blockers = |remaining: &[usize], i: usize| {
        remaining
            .iter()
            .filter(|&&j| j != i && in_front(j, i))
            .count()
    };

    while !remaining.is_empty() {
        let pick = remaining
            .iter()
            .position(|&i| blockers(&remaining, i) == 0)
            .unwrap_or_else(|| {
                tracing::debug!(
                    "Breaking depth-order cycle among {} units",
                    remaining.len()
                );
                remaining
                    .iter()
                    .enumerate()
                    .min_by_key(|&(_, &i)| blockers(&remaining, i))
                    .map_or(0, |(p, _)| p)
            });
        order.push(remaining.remove(pick));
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(min: Vec3, size: f32) -> Aabb {
        Aabb::new(min, min + Vec3::splat(size))
    }

    fn eye(position: Vec3) -> SortView {
        SortView::Perspective { position }
    }

    #[test]
    fn far_half_is_drawn_first() {
        let neg_x = Aabb::new(Vec3::ZERO, Vec3::new(50.0, 99.0, 99.0));
        let pos_x = Aabb::new(Vec3::new(50.0, 0.0, 0.0), Vec3::splat(99.0));
        let view = eye(Vec3::new(500.0, 50.0, 50.0));
        assert_eq!(sort_back_to_front(&[neg_x, pos_x], &view), vec![0, 1]);
        assert_eq!(sort_back_to_front(&[pos_x, neg_x], &view), vec![1, 0]);
    }

    #[test]
    fn compare_is_antisymmetric() {
        let a = cube(Vec3::ZERO, 1.0);
        let b = cube(Vec3::new(0.0, 1.0, 0.0), 1.0);
        for position in [Vec3::new(0.5, -4.0, 0.5), Vec3::new(3.0, 9.0, -2.0)] {
            let view = eye(position);
            let ab = compare(&a, &b, &view);
            assert!(ab.is_some());
            assert_eq!(compare(&b, &a, &view), ab.map(Ordering::reverse));
        }
    }

    #[test]
    fn interpenetrating_boxes_split_along_least_overlap() {
        // Overlaps are x = 1, y = 3, z = 4
        let a = Aabb::new(Vec3::ZERO, Vec3::splat(4.0));
        let b = Aabb::new(Vec3::new(3.0, 1.0, 0.0), Vec3::new(7.0, 4.0, 4.0));
        // Splitting on y would put a in front; splitting on x puts it behind
        let view = eye(Vec3::new(20.0, -30.0, 2.0));
        assert_eq!(compare(&a, &b, &view), Some(Ordering::Greater));
        assert_eq!(compare(&b, &a, &view), Some(Ordering::Less));
        assert_eq!(sort_back_to_front(&[a, b], &view), vec![0, 1]);

        let behind = eye(Vec3::new(-20.0, -30.0, 2.0));
        assert_eq!(compare(&a, &b, &behind), Some(Ordering::Less));
        assert_eq!(compare(&b, &a, &behind), Some(Ordering::Greater));
    }

    #[test]
    fn separated_boxes_are_unordered() {
        let a = cube(Vec3::ZERO, 1.0);
        let b = cube(Vec3::new(3.0, 0.0, 0.0), 1.0);
        assert_eq!(compare(&a, &b, &eye(Vec3::splat(10.0))), None);
    }

    #[test]
    fn parallel_view_uses_direction_only() {
        let a = cube(Vec3::ZERO, 1.0);
        let b = cube(Vec3::new(0.0, 0.0, 1.0), 1.0);
        // Looking down -Z: b (higher z) is closer
        let view = SortView::Parallel {
            direction: Vec3::NEG_Z,
        };
        assert_eq!(compare(&a, &b, &view), Some(Ordering::Greater));
        assert_eq!(sort_back_to_front(&[a, b], &view), vec![0, 1]);
    }

    #[test]
    fn grid_order_respects_every_adjacent_pair() {
        let mut boxes = Vec::new();
        for z in 0..3 {
            for y in 0..3 {
                for x in 0..3 {
                    boxes.push(cube(Vec3::new(x as f32, y as f32, z as f32), 1.0));
                }
            }
        }
        for position in [
            Vec3::new(-5.0, 1.5, 1.5),
            Vec3::new(1.2, 1.7, 1.1),
            Vec3::new(10.0, -3.0, 7.0),
        ] {
            let view = eye(position);
            let order = sort_back_to_front(&boxes, &view);
            let mut sorted = order.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..27).collect::<Vec<_>>());

            let rank: Vec<usize> = {
                let mut r = vec![0; 27];
                for (k, &i) in order.iter().enumerate() {
                    r[i] = k;
                }
                r
            };
            for i in 0..27 {
                for j in 0..27 {
                    if compare(&boxes[i], &boxes[j], &view) == Some(Ordering::Less) {
                        // i is in front, so it is drawn later
                        assert!(rank[i] > rank[j], "{i} before {j} from {position}");
                    }
                }
            }
        }
    }

    #[test]
    fn cycles_still_yield_a_permutation() {
        // 0 in front of 1, 1 in front of 2, 2 in front of 0
        let order = front_to_back(3, |i, j| (i + 1) % 3 == j);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2]);
        assert_eq!(order[0], 0);
    }

    #[test]
    fn model_transform_moves_camera_into_local_frame() {
        let camera = Camera::new(Vec3::new(10.0, 0.0, 0.0), Vec3::ZERO, Vec3::Y, 1.0, 1.0);
        let model = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        match SortView::from_camera(&camera, &model) {
            SortView::Perspective { position } => assert_eq!(position, Vec3::new(5.0, 0.0, 0.0)),
            SortView::Parallel { .. } => panic!("expected perspective"),
        }
    }

    #[test]
    fn empty_and_single_inputs() {
        let view = eye(Vec3::ZERO);
        assert!(sort_back_to_front::<Aabb>(&[], &view).is_empty());
        assert_eq!(sort_back_to_front(&[cube(Vec3::ONE, 1.0)], &view), vec![0]);
    }
}
