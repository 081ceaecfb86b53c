//! Per-residual-block Jacobians using `num-dual`.
//!
//! Every point-correspondence block depends on exactly one 9D pair block, so
//! forward-mode autodiff is applied to that local vector only and the 3×9
//! result is scattered into the global matrix. Fixed entries of the pair
//! block are evaluated but their columns are dropped.

use crate::factors::point_correspondence_residual;
use nalgebra::{SMatrix, SVector};
use num_dual::{jacobian, DualSVec64};

/// Dimension of the local parameter vector of one residual block.
pub(crate) const LOCAL_DIM: usize = 9;
/// Rows produced by one residual block.
pub(crate) const BLOCK_ROWS: usize = 3;

/// Residual and local Jacobian of one correspondence.
pub(crate) fn correspondence_block_jacobian(
    pair: &SVector<f64, LOCAL_DIM>,
    from: [f64; 3],
    to: [f64; 3],
) -> (SVector<f64, BLOCK_ROWS>, SMatrix<f64, BLOCK_ROWS, LOCAL_DIM>) {
    jacobian(
        |p: SVector<DualSVec64<LOCAL_DIM>, LOCAL_DIM>| {
            point_correspondence_residual(p.as_slice(), from, to)
        },
        *pair,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finite_difference(
        pair: &SVector<f64, LOCAL_DIM>,
        from: [f64; 3],
        to: [f64; 3],
    ) -> SMatrix<f64, BLOCK_ROWS, LOCAL_DIM> {
        let h = 1e-6;
        let mut j = SMatrix::<f64, BLOCK_ROWS, LOCAL_DIM>::zeros();
        for k in 0..LOCAL_DIM {
            let mut plus = *pair;
            let mut minus = *pair;
            plus[k] += h;
            minus[k] -= h;
            let rp = point_correspondence_residual(plus.as_slice(), from, to);
            let rm = point_correspondence_residual(minus.as_slice(), from, to);
            j.set_column(k, &((rp - rm) / (2.0 * h)));
        }
        j
    }

    #[test]
    fn autodiff_matches_finite_differences() {
        let pair = SVector::<f64, LOCAL_DIM>::from_row_slice(&[
            0.3, -0.2, 0.5, 1.0, -2.0, 0.5, 1.1, 0.9, 1.05,
        ]);
        let from = [0.7, -0.4, 1.3];
        let to = [0.0, 0.0, 0.0];

        let (r, j_ad) = correspondence_block_jacobian(&pair, from, to);
        let r_direct = point_correspondence_residual(pair.as_slice(), from, to);
        assert!((r - r_direct).norm() < 1e-12);

        let j_fd = finite_difference(&pair, from, to);
        assert!(
            (j_ad - j_fd).norm() < 1e-6,
            "autodiff/finite-difference mismatch: {}",
            (j_ad - j_fd).norm()
        );
    }

    #[test]
    fn jacobian_is_finite_at_identity() {
        let mut pair = SVector::<f64, LOCAL_DIM>::zeros();
        pair[6] = 1.0;
        pair[7] = 1.0;
        pair[8] = 1.0;
        let from = [1.0, 2.0, 3.0];

        let (_, j) = correspondence_block_jacobian(&pair, from, [0.0; 3]);
        assert!(j.iter().all(|v| v.is_finite()));

        // d(w × p)/dw = -[p]_x at w = 0.
        assert!((j[(0, 1)] - 3.0).abs() < 1e-12);
        assert!((j[(0, 2)] + 2.0).abs() < 1e-12);
        assert!((j[(1, 0)] + 3.0).abs() < 1e-12);
        // Translation columns are the identity.
        assert_eq!(j[(0, 3)], 1.0);
        assert_eq!(j[(1, 4)], 1.0);
        assert_eq!(j[(2, 5)], 1.0);
        // Scale columns carry the rotated point.
        assert!((j[(0, 6)] - 1.0).abs() < 1e-12);
        assert!((j[(2, 8)] - 3.0).abs() < 1e-12);
    }
}
