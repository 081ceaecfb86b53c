//! Mathematical utilities and type definitions.
//!
//! This module provides the scalar and matrix aliases used throughout the
//! workspace together with the axis-angle helpers shared by the closed-form
//! initializer and the autodiff residuals.

use nalgebra::{Matrix3, Matrix4, Point3, RealField, Rotation3, Vector3};

/// Scalar type used throughout the library (currently `f64`).
pub type Real = f64;

/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 4×4 matrix with [`Real`] entries.
pub type Mat4 = Matrix4<Real>;

/// Rotate `p` by the axis-angle vector `w` (Rodrigues formula).
///
/// Generic over [`RealField`] so the same code path is used by plain `f64`
/// evaluation and by dual-number autodiff. Near a zero rotation the
/// first-order expansion `p + w × p` is used; it is exact in value and
/// derivative at `w = 0`, which keeps Jacobians finite at the identity seed.
pub fn angle_axis_rotate<T: RealField>(w: &Vector3<T>, p: &Vector3<T>) -> Vector3<T> {
    let theta2 = w.norm_squared();
    if theta2 > nalgebra::convert::<f64, T>(f64::EPSILON) {
        let theta = theta2.sqrt();
        let (sin_theta, cos_theta) = theta.clone().sin_cos();
        let k = w.unscale(theta);
        let k_cross_p = k.cross(p);
        let k_dot_p = k.dot(p);
        p.scale(cos_theta.clone())
            + k_cross_p.scale(sin_theta)
            + k.scale(k_dot_p * (T::one() - cos_theta))
    } else {
        p + w.cross(p)
    }
}

/// Rotation matrix for an axis-angle vector.
pub fn rotation_from_axis_angle(w: &Vec3) -> Mat3 {
    Rotation3::new(*w).into_inner()
}

/// Axis-angle vector of a proper rotation matrix.
///
/// The caller is responsible for `r` being orthonormal with `det(r) = +1`.
pub fn axis_angle_from_rotation(r: &Mat3) -> Vec3 {
    Rotation3::from_matrix_unchecked(*r).scaled_axis()
}

/// Build a 4×4 affine matrix from a linear 3×3 block and a translation.
pub fn affine_from_parts(linear: &Mat3, translation: &Vec3) -> Mat4 {
    let mut m = Mat4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(linear);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    m
}

/// Apply a 4×4 affine matrix to a point.
pub fn transform_point_affine(m: &Mat4, p: &Pt3) -> Pt3 {
    let linear = m.fixed_view::<3, 3>(0, 0);
    let translation = m.fixed_view::<3, 1>(0, 3);
    Pt3::from(linear * p.coords + translation)
}

/// Invert a 4×4 affine matrix, returning `None` if the linear block is singular.
pub fn invert_affine(m: &Mat4) -> Option<Mat4> {
    let linear: Mat3 = m.fixed_view::<3, 3>(0, 0).into_owned();
    let translation: Vec3 = m.fixed_view::<3, 1>(0, 3).into_owned();
    let inv = linear.try_inverse()?;
    Some(affine_from_parts(&inv, &(-(inv * translation))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn rodrigues_matches_rotation_matrix() {
        let w = Vec3::new(0.3, -0.2, 0.9);
        let p = Vec3::new(1.0, 2.0, -0.5);
        let a = angle_axis_rotate(&w, &p);
        let b = rotation_from_axis_angle(&w) * p;
        assert!((a - b).norm() < 1e-12, "rodrigues mismatch: {a} vs {b}");
    }

    #[test]
    fn quarter_turn_about_z() {
        let w = Vec3::new(0.0, 0.0, FRAC_PI_2);
        let p = Vec3::new(1.0, 0.0, 0.0);
        let q = angle_axis_rotate(&w, &p);
        assert!((q - Vec3::new(0.0, 1.0, 0.0)).norm() < 1e-12, "got {q}");
    }

    #[test]
    fn axis_angle_roundtrip() {
        let w = Vec3::new(-0.4, 0.1, 0.25);
        let r = rotation_from_axis_angle(&w);
        let back = axis_angle_from_rotation(&r);
        assert!((w - back).norm() < 1e-12, "expected {w}, got {back}");
    }

    #[test]
    fn affine_inverse_undoes_transform() {
        let linear = rotation_from_axis_angle(&Vec3::new(0.1, 0.2, 0.3)) * 2.0;
        let m = affine_from_parts(&linear, &Vec3::new(1.0, -2.0, 0.5));
        let inv = invert_affine(&m).unwrap();
        let p = Pt3::new(0.3, 0.4, 0.5);
        let back = transform_point_affine(&inv, &transform_point_affine(&m, &p));
        assert!((back - p).norm() < 1e-12, "roundtrip error: {}", (back - p).norm());
    }

    #[test]
    fn singular_affine_has_no_inverse() {
        let mut m = Mat4::identity();
        m[(2, 2)] = 0.0;
        assert!(invert_affine(&m).is_none());
    }
}
