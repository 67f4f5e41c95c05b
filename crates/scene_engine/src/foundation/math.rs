//! Math utilities and types
//!
//! Provides the nalgebra aliases used across the engine plus the handful of
//! helpers the transform and culling code share.

pub use nalgebra::{
    Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Build a model matrix as `translation(position) * rotation * scale(scale)`.
pub fn trs_matrix(position: &Vec3, rotation: &Quat, scale: &Vec3) -> Mat4 {
    Mat4::new_translation(position)
        * rotation.to_homogeneous()
        * Mat4::new_nonuniform_scaling(scale)
}

/// Inverse-transpose of the upper 3x3 of `model`, padded back to 4x4.
///
/// A singular model matrix (a zero scale axis) yields the identity.
pub fn normal_matrix(model: &Mat4) -> Mat4 {
    let upper: Mat3 = model.fixed_view::<3, 3>(0, 0).into_owned();
    let normal = upper
        .try_inverse()
        .map(|inverse| inverse.transpose())
        .unwrap_or_else(Mat3::identity);
    normal.to_homogeneous()
}

/// Largest absolute component of a scale vector.
///
/// Bounding spheres are scaled by this so they stay conservative under
/// non-uniform scale.
pub fn max_axis_scale(scale: &Vec3) -> f32 {
    scale.x.abs().max(scale.y.abs()).max(scale.z.abs())
}

/// Transform a point by an affine matrix.
pub fn transform_point(matrix: &Mat4, point: &Vec3) -> Vec3 {
    matrix.transform_point(&Point3::from(*point)).coords
}

/// Convert a matrix into the column-major array layout GPU records use.
pub fn to_cols_array(matrix: &Mat4) -> [[f32; 4]; 4] {
    (*matrix).into()
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Pi / 2
    pub const HALF_PI: f32 = PI * 0.5;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_trs_matrix_applies_scale_then_rotation_then_translation() {
        let rotation = Quat::from_axis_angle(&Vec3::y_axis(), constants::HALF_PI);
        let model = trs_matrix(&Vec3::new(1.0, 0.0, 0.0), &rotation, &Vec3::new(2.0, 2.0, 2.0));

        // (1,0,0) scaled to (2,0,0), rotated 90° around Y to (0,0,-2), then moved by +X
        let moved = transform_point(&model, &Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(moved, Vec3::new(1.0, 0.0, -2.0), epsilon = 1e-5);
    }

    #[test]
    fn test_normal_matrix_undoes_non_uniform_scale() {
        let model = trs_matrix(&Vec3::zeros(), &Quat::identity(), &Vec3::new(2.0, 4.0, 1.0));
        let normal = normal_matrix(&model);

        assert_relative_eq!(normal[(0, 0)], 0.5, epsilon = 1e-6);
        assert_relative_eq!(normal[(1, 1)], 0.25, epsilon = 1e-6);
        assert_relative_eq!(normal[(2, 2)], 1.0, epsilon = 1e-6);
        assert_relative_eq!(normal[(3, 3)], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normal_matrix_of_singular_model_is_identity() {
        let model = trs_matrix(&Vec3::zeros(), &Quat::identity(), &Vec3::new(0.0, 1.0, 1.0));
        assert_eq!(normal_matrix(&model), Mat4::identity());
    }

    #[test]
    fn test_max_axis_scale_ignores_sign() {
        assert_eq!(max_axis_scale(&Vec3::new(10.0, 0.01, -12.0)), 12.0);
    }
}
