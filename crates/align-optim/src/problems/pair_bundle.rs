//! Joint refinement of all pairwise camera transforms.
//!
//! Every ordered pair `(from, to)` with enough correspondences contributes one
//! 9D parameter block `pair/{from}->{to}` (`[rotation, translation, scale]`)
//! and one 3D residual block per correspondence:
//!
//! ```text
//! r = scale ⊙ (R(rotation) · p_from) + translation − p_to
//! ```
//!
//! The problem is rebuilt from scratch on every call; only parameter values
//! carry over between calls.

use crate::backend::{solve_with_backend, BackendKind, BackendSolveOptions};
use crate::ir::{FactorKind, FixedMask, ProblemIR, ResidualBlock};
use crate::params::{dvec_to_pair_transform, pair_transform_to_dvec, SCALE_INDICES};
use align_core::{Correspondence, PairTransform, Pt3, Real};
use anyhow::{anyhow, bail, ensure, Result};
use log::{debug, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Ordered camera pair `(from, to)`.
pub type PairKey = (usize, usize);

/// IR parameter name of the pair block.
pub fn pair_param_name(from: usize, to: usize) -> String {
    format!("pair/{}->{}", from, to)
}

/// Correspondences of one ordered pair.
#[derive(Debug, Clone)]
pub struct PairObservations {
    pub from: usize,
    pub to: usize,
    pub from_points: Vec<Pt3>,
    pub to_points: Vec<Pt3>,
}

impl PairObservations {
    pub fn new(from: usize, to: usize, from_points: Vec<Pt3>, to_points: Vec<Pt3>) -> Result<Self> {
        ensure!(from != to, "pair {}->{} maps a camera onto itself", from, to);
        ensure!(
            from_points.len() == to_points.len(),
            "pair {}->{}: point count mismatch {} vs {}",
            from,
            to,
            from_points.len(),
            to_points.len()
        );
        Ok(Self {
            from,
            to,
            from_points,
            to_points,
        })
    }

    pub fn len(&self) -> usize {
        self.from_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.from_points.is_empty()
    }
}

/// Observations for every pair taking part in the joint solve.
#[derive(Debug, Clone, Default)]
pub struct PairBundleDataset {
    pub pairs: Vec<PairObservations>,
}

impl PairBundleDataset {
    pub fn new(pairs: Vec<PairObservations>) -> Result<Self> {
        for pair in &pairs {
            ensure!(
                pair.from != pair.to,
                "pair {}->{} maps a camera onto itself",
                pair.from,
                pair.to
            );
        }
        Ok(Self { pairs })
    }

    /// Build from filtered correspondences.
    pub fn from_correspondences<'a, I>(correspondences: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Correspondence>,
    {
        let pairs = correspondences
            .into_iter()
            .map(|c| {
                PairObservations::new(c.from, c.to, c.from_points.clone(), c.to_points.clone())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { pairs })
    }

    pub fn num_correspondences(&self) -> usize {
        self.pairs.iter().map(PairObservations::len).sum()
    }
}

/// Solve options for the pair bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairBundleSolveOptions {
    /// Pairs with fewer correspondences are left out of the problem.
    pub min_correspondences: usize,
    /// Keep the per-axis scale of every pair at its initial value.
    pub fix_scale: bool,
}

impl Default for PairBundleSolveOptions {
    fn default() -> Self {
        Self {
            min_correspondences: 3,
            fix_scale: false,
        }
    }
}

/// Summary of one joint solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairBundleReport {
    pub num_pairs: usize,
    pub num_residuals: usize,
    pub initial_cost: Real,
    pub final_cost: Real,
    /// Outer solver iterations, at most the configured cap.
    pub iterations: usize,
    pub evaluations: usize,
    /// `false` when the iteration cap ended the solve.
    pub converged: bool,
}

/// Result of the joint solve.
#[derive(Debug, Clone)]
pub struct PairBundleResult {
    /// Refined transforms of the pairs that took part.
    pub refined: BTreeMap<PairKey, PairTransform>,
    /// Pairs left out for lack of correspondences.
    pub skipped: Vec<PairKey>,
    pub report: PairBundleReport,
}

/// Build IR for the pair bundle.
///
/// Returns the IR, the initial parameter map and the pairs that were left out.
pub fn build_pair_bundle_ir(
    dataset: &PairBundleDataset,
    initial: &BTreeMap<PairKey, PairTransform>,
    opts: &PairBundleSolveOptions,
) -> Result<(ProblemIR, HashMap<String, DVector<f64>>, Vec<PairKey>)> {
    let mut ir = ProblemIR::new();
    let mut initial_map = HashMap::new();
    let mut skipped = Vec::new();

    let fixed = if opts.fix_scale {
        FixedMask::fix_indices(&SCALE_INDICES)
    } else {
        FixedMask::all_free()
    };

    for pair in &dataset.pairs {
        ensure!(
            pair.from != pair.to,
            "pair {}->{} maps a camera onto itself",
            pair.from,
            pair.to
        );
        if pair.len() < opts.min_correspondences.max(1) {
            debug!(
                "pair {}->{}: {} correspondences, left out of joint solve",
                pair.from,
                pair.to,
                pair.len()
            );
            skipped.push((pair.from, pair.to));
            continue;
        }

        let seed = initial
            .get(&(pair.from, pair.to))
            .ok_or_else(|| anyhow!("no initial transform for pair {}->{}", pair.from, pair.to))?;
        ensure!(
            seed.is_finite(),
            "initial transform for pair {}->{} is not finite",
            pair.from,
            pair.to
        );

        let key = pair_param_name(pair.from, pair.to);
        ensure!(
            ir.param_by_name(&key).is_none(),
            "pair {}->{} listed twice",
            pair.from,
            pair.to
        );
        let id = ir.add_param_block(&key, 9, fixed.clone());
        initial_map.insert(key, pair_transform_to_dvec(seed));

        for (a, b) in pair.from_points.iter().zip(&pair.to_points) {
            ir.add_residual_block(ResidualBlock {
                params: vec![id],
                factor: FactorKind::PointCorrespondence {
                    from: [a.x, a.y, a.z],
                    to: [b.x, b.y, b.z],
                },
                residual_dim: 3,
            });
        }
    }

    ir.validate()?;
    Ok((ir, initial_map, skipped))
}

/// Refine all pair transforms jointly.
pub fn optimize_pair_bundle(
    dataset: &PairBundleDataset,
    initial: &BTreeMap<PairKey, PairTransform>,
    opts: &PairBundleSolveOptions,
    backend_opts: &BackendSolveOptions,
) -> Result<PairBundleResult> {
    let (ir, initial_map, skipped) = build_pair_bundle_ir(dataset, initial, opts)?;
    if ir.params.is_empty() {
        bail!(
            "no pair has at least {} correspondences",
            opts.min_correspondences
        );
    }
    for (from, to) in &skipped {
        warn!("pair {}->{} is under-constrained and keeps its seed", from, to);
    }

    let solution = solve_with_backend(BackendKind::DenseLm, &ir, &initial_map, backend_opts)?;

    let mut refined = BTreeMap::new();
    for pair in &dataset.pairs {
        let key = pair_param_name(pair.from, pair.to);
        let Some(values) = solution.params.get(&key) else {
            continue;
        };
        refined.insert((pair.from, pair.to), dvec_to_pair_transform(values.as_view())?);
    }

    let report = PairBundleReport {
        num_pairs: ir.params.len(),
        num_residuals: ir.residuals.len(),
        initial_cost: solution.initial_cost,
        final_cost: solution.final_cost,
        iterations: solution.iterations,
        evaluations: solution.evaluations,
        converged: solution.converged,
    };
    if backend_opts.verbose {
        debug!(
            "pair bundle: {} pairs, {} correspondences, cost {:.6e} -> {:.6e}",
            report.num_pairs, report.num_residuals, report.initial_cost, report.final_cost
        );
    }

    Ok(PairBundleResult {
        refined,
        skipped,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(from: usize, to: usize, n: usize) -> PairObservations {
        let pts: Vec<Pt3> = (0..n)
            .map(|i| Pt3::new(i as f64, (i * i) as f64 * 0.1, 1.0 + (i % 2) as f64))
            .collect();
        PairObservations::new(from, to, pts.clone(), pts).unwrap()
    }

    #[test]
    fn one_block_per_pair_and_residual_per_point() {
        let dataset = PairBundleDataset::new(vec![obs(0, 1, 4), obs(1, 0, 4), obs(0, 2, 2)]).unwrap();
        let initial: BTreeMap<PairKey, PairTransform> = [(0, 1), (1, 0), (0, 2)]
            .into_iter()
            .map(|k| (k, PairTransform::identity()))
            .collect();

        let (ir, init, skipped) =
            build_pair_bundle_ir(&dataset, &initial, &PairBundleSolveOptions::default()).unwrap();

        assert_eq!(ir.params.len(), 2);
        assert_eq!(ir.residuals.len(), 8);
        assert_eq!(skipped, vec![(0, 2)]);
        assert!(init.contains_key("pair/0->1"));
        assert!(init.contains_key("pair/1->0"));
        assert!(ir.param_by_name("pair/0->0").is_none());
    }

    #[test]
    fn self_pairs_are_rejected() {
        let pts = vec![Pt3::origin(); 3];
        assert!(PairObservations::new(1, 1, pts.clone(), pts).is_err());
    }

    #[test]
    fn missing_seed_is_an_error() {
        let dataset = PairBundleDataset::new(vec![obs(0, 1, 4)]).unwrap();
        let result =
            build_pair_bundle_ir(&dataset, &BTreeMap::new(), &PairBundleSolveOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn fix_scale_masks_scale_entries() {
        let dataset = PairBundleDataset::new(vec![obs(0, 1, 4)]).unwrap();
        let initial = BTreeMap::from([((0, 1), PairTransform::identity())]);
        let opts = PairBundleSolveOptions {
            fix_scale: true,
            ..Default::default()
        };
        let (ir, _, _) = build_pair_bundle_ir(&dataset, &initial, &opts).unwrap();
        assert_eq!(ir.free_params(), 6);
    }
}
