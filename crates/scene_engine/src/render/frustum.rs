//! View frustum
//!
//! Six inward-facing planes extracted from a view-projection matrix
//! (Gribb/Hartmann). A point is inside when its signed distance to every
//! plane is non-negative; a sphere intersects when no plane has it entirely
//! on the outside.

use crate::foundation::math::{Mat4, Vec3, Vec4};

/// Plane `normal · p + distance = 0` with a unit normal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal pointing into the frustum
    pub normal: Vec3,
    /// Offset along the normal
    pub distance: f32,
}

impl Plane {
    /// Build from raw coefficients, normalizing the normal
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.xyz();
        let length = normal.norm();
        if length <= f32::EPSILON {
            return Self {
                normal,
                distance: coefficients.w,
            };
        }
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    /// Signed distance of `point`; positive on the inner side
    pub fn signed_distance(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Index of each plane in [`Frustum::planes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneSide {
    /// Left clip plane
    Left = 0,
    /// Right clip plane
    Right = 1,
    /// Bottom clip plane
    Bottom = 2,
    /// Top clip plane
    Top = 3,
    /// Near clip plane
    Near = 4,
    /// Far clip plane
    Far = 5,
}

/// Convex volume bounded by six planes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    /// Extract the planes of a view-projection matrix with a [-1, 1] clip depth
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let row = |i: usize| {
            Vec4::new(
                view_projection[(i, 0)],
                view_projection[(i, 1)],
                view_projection[(i, 2)],
                view_projection[(i, 3)],
            )
        };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r3 + r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// Frustum from explicit planes
    pub fn from_planes(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// All six planes
    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// One plane by side
    pub fn plane(&self, side: PlaneSide) -> &Plane {
        &self.planes[side as usize]
    }

    /// Whether a sphere touches the volume
    pub fn intersects_sphere(&self, center: &Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }

    /// Whether a point lies inside the volume
    pub fn contains_point(&self, point: &Vec3) -> bool {
        self.intersects_sphere(point, 0.0)
    }
}
