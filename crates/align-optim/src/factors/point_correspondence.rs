//! Point-correspondence residual model.

use align_core::math::angle_axis_rotate;
use nalgebra::{RealField, SVector, Vector3};

/// Residual of one correspondence under a 9D pair transform.
///
/// `pair = [rotation (axis-angle), translation, scale]` and the residual is
/// `scale ⊙ (R(rotation) · from) + translation − to`, ordered `[x, y, z]`.
pub fn point_correspondence_residual<T: RealField>(
    pair: &[T],
    from: [f64; 3],
    to: [f64; 3],
) -> SVector<T, 3> {
    debug_assert!(pair.len() == 9, "pair transform must have 9 params");

    let w = Vector3::new(pair[0].clone(), pair[1].clone(), pair[2].clone());
    let t = Vector3::new(pair[3].clone(), pair[4].clone(), pair[5].clone());
    let s = Vector3::new(pair[6].clone(), pair[7].clone(), pair[8].clone());

    let p_from = Vector3::new(
        nalgebra::convert::<f64, T>(from[0]),
        nalgebra::convert::<f64, T>(from[1]),
        nalgebra::convert::<f64, T>(from[2]),
    );
    let p_to = Vector3::new(
        nalgebra::convert::<f64, T>(to[0]),
        nalgebra::convert::<f64, T>(to[1]),
        nalgebra::convert::<f64, T>(to[2]),
    );

    angle_axis_rotate(&w, &p_from).component_mul(&s) + t - p_to
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::{PairTransform, Pt3};

    #[test]
    fn residual_matches_pair_transform() {
        let pair = PairTransform {
            rotation: [0.3, 0.1, -0.2],
            translation: [0.5, -1.0, 2.0],
            scale: [1.0, 1.2, 0.8],
        };
        let from = [0.4, 0.5, 0.6];
        let mapped = pair.transform_point(&Pt3::new(from[0], from[1], from[2]));
        let to = [1.0, 1.0, 1.0];

        let r = point_correspondence_residual(&pair.to_params(), from, to);
        assert!((r.x - (mapped.x - 1.0)).abs() < 1e-12);
        assert!((r.y - (mapped.y - 1.0)).abs() < 1e-12);
        assert!((r.z - (mapped.z - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn identity_residual_is_point_difference() {
        let r = point_correspondence_residual(
            &PairTransform::identity().to_params(),
            [1.0, 2.0, 3.0],
            [0.5, 2.0, 4.0],
        );
        assert_eq!(r, SVector::<f64, 3>::new(0.5, 0.0, -1.0));
    }
}
