//! Perspective camera
//!
//! Right-handed, Y-up, looking down -Z in view space with an OpenGL-style
//! [-1, 1] clip depth. Produces the view-projection matrix and the frustum
//! the culler tests against.

use crate::foundation::math::{Mat4, Point3, Vec3};

use super::frustum::Frustum;

/// Perspective camera
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// World-space eye position
    pub position: Vec3,
    /// Point the camera looks at
    pub target: Vec3,
    /// Up vector
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Width over height
    pub aspect: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl Camera {
    /// Perspective camera at `position` looking down -Z
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: position - Vec3::z(),
            up: Vec3::y(),
            fov_y: fov_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    /// Point the camera at `target`
    pub fn looking_at(mut self, target: Vec3) -> Self {
        self.target = target;
        self
    }

    /// World-to-view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(
            &Point3::from(self.position),
            &Point3::from(self.target),
            &self.up,
        )
    }

    /// View-to-clip matrix
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::new_perspective(self.aspect, self.fov_y, self.near, self.far)
    }

    /// World-to-clip matrix
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Frustum of the current view
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }
}
