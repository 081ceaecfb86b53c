//! Pairwise camera transform parameterization.
//!
//! A [`PairTransform`] maps points from one camera's frame into another's:
//!
//! ```text
//! p' = scale ⊙ (R(rotation) · p) + translation
//! ```
//!
//! where `R(rotation)` is the rotation for an axis-angle vector and `⊙` is the
//! per-axis (component-wise) product. The equivalent affine matrix is
//! `[diag(scale) · R | translation]`.

use crate::math::{
    affine_from_parts, angle_axis_rotate, axis_angle_from_rotation, rotation_from_axis_angle,
};
use crate::{Mat3, Mat4, Pt3, Real, Vec3};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Number of scalar parameters in a [`PairTransform`].
pub const PAIR_PARAM_DIM: usize = 9;

/// Rotation (axis-angle), translation and per-axis scale for an ordered camera pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairTransform {
    pub rotation: [Real; 3],
    pub translation: [Real; 3],
    pub scale: [Real; 3],
}

impl Default for PairTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl PairTransform {
    /// Zero rotation, zero translation, unit scale.
    pub const fn identity() -> Self {
        Self {
            rotation: [0.0; 3],
            translation: [0.0; 3],
            scale: [1.0; 3],
        }
    }

    /// Build from a similarity `p' = s R p + t` (uniform scale).
    ///
    /// `rotation` must be a proper rotation matrix.
    pub fn from_similarity(rotation: &Mat3, scale: Real, translation: &Vec3) -> Self {
        let w = axis_angle_from_rotation(rotation);
        Self {
            rotation: [w.x, w.y, w.z],
            translation: [translation.x, translation.y, translation.z],
            scale: [scale; 3],
        }
    }

    pub fn rotation_vector(&self) -> Vec3 {
        Vec3::from(self.rotation)
    }

    pub fn translation_vector(&self) -> Vec3 {
        Vec3::from(self.translation)
    }

    pub fn scale_vector(&self) -> Vec3 {
        Vec3::from(self.scale)
    }

    /// Rotation matrix `R(rotation)`.
    pub fn rotation_matrix(&self) -> Mat3 {
        rotation_from_axis_angle(&self.rotation_vector())
    }

    /// Affine matrix `[diag(scale) · R | translation]`.
    pub fn to_matrix(&self) -> Mat4 {
        let linear = Mat3::from_diagonal(&self.scale_vector()) * self.rotation_matrix();
        affine_from_parts(&linear, &self.translation_vector())
    }

    /// Apply the transform to a point (rotate, scale, translate).
    pub fn transform_point(&self, p: &Pt3) -> Pt3 {
        let rotated = angle_axis_rotate(&self.rotation_vector(), &p.coords);
        Pt3::from(rotated.component_mul(&self.scale_vector()) + self.translation_vector())
    }

    /// Pack as `[rotation, translation, scale]`.
    pub fn to_params(&self) -> [Real; PAIR_PARAM_DIM] {
        let mut out = [0.0; PAIR_PARAM_DIM];
        out[0..3].copy_from_slice(&self.rotation);
        out[3..6].copy_from_slice(&self.translation);
        out[6..9].copy_from_slice(&self.scale);
        out
    }

    /// Unpack from `[rotation, translation, scale]`.
    pub fn from_params(params: &[Real]) -> Result<Self> {
        ensure!(
            params.len() == PAIR_PARAM_DIM,
            "expected pair transform vector of length {}, got {}",
            PAIR_PARAM_DIM,
            params.len()
        );
        Ok(Self {
            rotation: [params[0], params[1], params[2]],
            translation: [params[3], params[4], params[5]],
            scale: [params[6], params[7], params[8]],
        })
    }

    /// Returns `true` if every parameter is finite.
    pub fn is_finite(&self) -> bool {
        self.to_params().iter().all(|v| v.is_finite())
    }
}
