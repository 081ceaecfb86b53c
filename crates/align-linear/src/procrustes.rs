//! Closed-form absolute orientation (Umeyama similarity alignment).
//!
//! Given identifier-aligned points `x_i` (source) and `y_i` (target), finds the
//! rotation `R`, uniform scale `c` and translation `t` minimizing
//! `Σ ‖c R x_i + t − y_i‖²`:
//!
//! ```text
//! Σ   = (1/n) Σ (y_i − μ_y)(x_i − μ_x)^T = U D V^T
//! S   = diag(1, 1, sign(det U · det V))    (reflection correction)
//! R   = U S V^T
//! c   = tr(D S) / σ_x²
//! t   = μ_y − c R μ_x
//! ```

use align_core::{Mat3, PairTransform, Pt3, Real, Vec3};
use thiserror::Error;

/// Minimum number of correspondences for a unique similarity.
pub const MIN_PROCRUSTES_POINTS: usize = 3;

/// Second singular value relative to the first below which the
/// configuration is treated as collinear.
const RANK_TOLERANCE: Real = 1e-10;

/// Variance (relative to the squared centroid distance) below which all
/// points are treated as coincident.
const SPREAD_TOLERANCE: Real = 1e-14;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcrustesError {
    #[error("need at least 3 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("point count mismatch: {from} source vs {to} target points")]
    Mismatched { from: usize, to: usize },
    #[error("degenerate point configuration: {0}")]
    Degenerate(&'static str),
    #[error("svd failed")]
    SvdFailed,
}

/// Similarity transform `y = scale · rotation · x + translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub rotation: Mat3,
    pub scale: Real,
    pub translation: Vec3,
}

impl Similarity {
    pub fn transform_point(&self, p: &Pt3) -> Pt3 {
        Pt3::from(self.rotation * p.coords * self.scale + self.translation)
    }

    /// Equivalent pair transform with uniform per-axis scale.
    pub fn to_pair_transform(&self) -> PairTransform {
        PairTransform::from_similarity(&self.rotation, self.scale, &self.translation)
    }

    /// Root-mean-square alignment error over the given correspondences.
    pub fn rms_error(&self, from: &[Pt3], to: &[Pt3]) -> Real {
        if from.is_empty() {
            return 0.0;
        }
        let sum: Real = from
            .iter()
            .zip(to)
            .map(|(x, y)| (self.transform_point(x) - y).norm_squared())
            .sum();
        (sum / from.len() as Real).sqrt()
    }
}

fn centroid(points: &[Pt3]) -> Vec3 {
    let mut c = Vec3::zeros();
    for p in points {
        c += p.coords;
    }
    c / points.len() as Real
}

fn spread(points: &[Pt3], centroid: &Vec3) -> Real {
    points
        .iter()
        .map(|p| (p.coords - centroid).norm_squared())
        .sum::<Real>()
        / points.len() as Real
}

/// Estimate the similarity mapping `from` onto `to`.
///
/// Fails on fewer than [`MIN_PROCRUSTES_POINTS`] correspondences, on
/// coincident points and on collinear configurations.
pub fn umeyama(from: &[Pt3], to: &[Pt3]) -> Result<Similarity, ProcrustesError> {
    if from.len() != to.len() {
        return Err(ProcrustesError::Mismatched {
            from: from.len(),
            to: to.len(),
        });
    }
    let n = from.len();
    if n < MIN_PROCRUSTES_POINTS {
        return Err(ProcrustesError::NotEnoughPoints(n));
    }

    let mu_x = centroid(from);
    let mu_y = centroid(to);
    let sigma_x = spread(from, &mu_x);
    let sigma_y = spread(to, &mu_y);

    if sigma_x <= SPREAD_TOLERANCE * mu_x.norm_squared().max(1.0) {
        return Err(ProcrustesError::Degenerate("source points coincide"));
    }
    if sigma_y <= SPREAD_TOLERANCE * mu_y.norm_squared().max(1.0) {
        return Err(ProcrustesError::Degenerate("target points coincide"));
    }

    let mut cov = Mat3::zeros();
    for (x, y) in from.iter().zip(to) {
        cov += (y.coords - mu_y) * (x.coords - mu_x).transpose();
    }
    cov /= n as Real;

    let svd = cov.svd(true, true);
    let u = svd.u.ok_or(ProcrustesError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(ProcrustesError::SvdFailed)?;
    let d = svd.singular_values;

    let mut sorted = [d[0], d[1], d[2]];
    sorted.sort_by(|a, b| b.total_cmp(a));
    if sorted[1] <= RANK_TOLERANCE * sorted[0] {
        return Err(ProcrustesError::Degenerate("points are collinear"));
    }

    // Flip the axis of the smallest singular value when U V^T is a reflection.
    let mut s = Vec3::new(1.0, 1.0, 1.0);
    if u.determinant() * v_t.determinant() < 0.0 {
        let smallest = d.imin();
        s[smallest] = -1.0;
    }

    let rotation = u * Mat3::from_diagonal(&s) * v_t;
    let scale = d.dot(&s) / sigma_x;
    if !scale.is_finite() || scale <= 0.0 {
        return Err(ProcrustesError::Degenerate("non-positive scale"));
    }
    let translation = mu_y - rotation * mu_x * scale;

    Ok(Similarity {
        rotation,
        scale,
        translation,
    })
}
