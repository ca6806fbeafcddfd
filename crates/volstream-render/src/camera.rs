//! Camera and view management.

use glam::{Mat4, Vec3};
use volstream_core::Version;

/// Projection model of a camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective with vertical field of view in radians.
    Perspective { fov: f32 },
    /// Orthographic with the given view height in world units.
    Parallel { height: f32 },
}

/// Camera for rendering.
///
/// Every setter advances [`Camera::version`], which mappers use to decide
/// whether a cached draw order is still valid.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    direction: Vec3,
    up: Vec3,
    projection: Projection,
    aspect: f32,
    near: f32,
    far: f32,
    version: Version,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            projection: Projection::Perspective {
                fov: std::f32::consts::FRAC_PI_4,
            },
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
            version: Version::next(),
        }
    }
}

impl Camera {
    /// Create a perspective camera looking at `target`.
    pub fn new(position: Vec3, target: Vec3, up: Vec3, fov: f32, aspect: f32) -> Self {
        Self {
            position,
            direction: (target - position).normalize_or(Vec3::NEG_Z),
            up,
            projection: Projection::Perspective { fov },
            aspect,
            ..Self::default()
        }
    }

    /// Create a parallel-projection camera looking along `direction`.
    pub fn parallel(position: Vec3, direction: Vec3, up: Vec3, height: f32, aspect: f32) -> Self {
        Self {
            position,
            direction: direction.normalize_or(Vec3::NEG_Z),
            up,
            projection: Projection::Parallel { height },
            aspect,
            ..Self::default()
        }
    }

    /// Camera position in world space.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Unit view direction in world space.
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Projection model.
    pub fn projection(&self) -> Projection {
        self.projection
    }

    /// Whether the camera uses a parallel projection.
    pub fn is_parallel(&self) -> bool {
        matches!(self.projection, Projection::Parallel { .. })
    }

    /// Near clipping distance.
    pub fn near(&self) -> f32 {
        self.near
    }

    /// Version of the last change.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Set the camera position.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.version.touch();
    }

    /// Look at a target position.
    pub fn look_at(&mut self, target: Vec3) {
        self.direction = (target - self.position).normalize_or(self.direction);
        self.version.touch();
    }

    /// Set the projection model.
    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.version.touch();
    }

    /// Set the aspect ratio.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.version.touch();
    }

    /// Set the clipping range.
    pub fn set_clipping_range(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        self.version.touch();
    }

    /// Point on the near plane straight ahead of the camera.
    pub fn near_plane_point(&self) -> Vec3 {
        self.position + self.direction * self.near
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.direction, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov } => {
                Mat4::perspective_rh(fov, self.aspect, self.near, self.far)
            }
            Projection::Parallel { height } => {
                let h = height * 0.5;
                let w = h * self.aspect;
                Mat4::orthographic_rh(-w, w, -h, h, self.near, self.far)
            }
        }
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn setters_advance_version() {
        let mut camera = Camera::default();
        let before = camera.version();
        camera.set_position(Vec3::X);
        assert!(camera.version() > before);
    }

    #[test]
    fn parallel_projection_keeps_depth_linear() {
        let camera = Camera::parallel(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y, 2.0, 1.0);
        assert!(camera.is_parallel());
        let p = camera
            .view_projection_matrix()
            .project_point3(Vec3::new(1.0, 1.0, -5.0));
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn near_plane_point_is_ahead() {
        let camera = Camera::new(Vec3::ZERO, Vec3::X, Vec3::Y, 1.0, 1.0);
        assert_relative_eq!(camera.near_plane_point().x, camera.near());
    }
}
