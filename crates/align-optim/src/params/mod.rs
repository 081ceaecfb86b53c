//! Conversions between domain types and solver parameter vectors.

use align_core::{PairTransform, PAIR_PARAM_DIM};
use anyhow::Result;
use nalgebra::{DVector, DVectorView};

/// Pack a pair transform as the 9D vector `[rotation, translation, scale]`.
pub fn pair_transform_to_dvec(pair: &PairTransform) -> DVector<f64> {
    DVector::from_row_slice(&pair.to_params())
}

/// Unpack a 9D `[rotation, translation, scale]` vector.
pub fn dvec_to_pair_transform(v: DVectorView<'_, f64>) -> Result<PairTransform> {
    anyhow::ensure!(
        v.len() == PAIR_PARAM_DIM,
        "expected pair vector of length {}, got {}",
        PAIR_PARAM_DIM,
        v.len()
    );
    let values: Vec<f64> = v.iter().copied().collect();
    PairTransform::from_params(&values)
}

/// Indices of the per-axis scale inside a pair vector.
pub const SCALE_INDICES: [usize; 3] = [6, 7, 8];
