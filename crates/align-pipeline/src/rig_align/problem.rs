//! [`ProblemType`] implementation for multi-camera rig alignment.

use align_core::{CharacteristicPointSet, CorrespondenceSource, Mat4, PairStats, PairTransform, Real};
use align_linear::{CameraSupport, MIN_PROCRUSTES_POINTS};
use align_optim::PairBundleReport;
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::session::{InvalidationPolicy, ProblemType};

use super::state::{CalibrationPhase, CalibrationState, PairStatus};

// ─────────────────────────────────────────────────────────────────────────────
// Input
// ─────────────────────────────────────────────────────────────────────────────

/// One characteristic point set per camera.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RigAlignInput {
    pub point_sets: Vec<CharacteristicPointSet>,
    /// Where the point sets came from, for logs only.
    #[serde(default)]
    pub source: String,
}

impl RigAlignInput {
    pub fn new(point_sets: Vec<CharacteristicPointSet>) -> Self {
        Self {
            point_sets,
            source: "captured".to_string(),
        }
    }

    /// Pull the point sets out of any source, captured or synthetic.
    pub fn from_source<S: CorrespondenceSource + ?Sized>(source: &S) -> Result<Self> {
        let point_sets = source.point_sets()?;
        ensure!(
            point_sets.len() == source.num_cameras(),
            "source {} returned {} point sets for {} cameras",
            source.label(),
            point_sets.len(),
            source.num_cameras()
        );
        Ok(Self {
            point_sets,
            source: source.label().to_string(),
        })
    }

    pub fn num_cameras(&self) -> usize {
        self.point_sets.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

/// Rig alignment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigAlignConfig {
    /// Coordinates with a larger magnitude mark the point invalid.
    pub validity_bound: Real,
    /// Camera whose frame is the shared reference.
    pub reference_camera: usize,
    /// Pairs with fewer valid correspondences keep their seed.
    pub min_correspondences: usize,
    /// Solver iteration cap per refine pass.
    pub max_iters: usize,
    /// A refine run is stalled once this many passes fail to improve.
    pub max_passes_without_improvement: usize,
    /// Upper bound on passes in [`run_calibration`](super::run_calibration).
    pub max_refine_passes: usize,
    /// [`run_calibration`](super::run_calibration) stops once the best cost is at or below this.
    pub min_cost: Real,
    pub improvement_rel_tol: Real,
    pub improvement_abs_tol: Real,
    pub ftol: Real,
    pub xtol: Real,
    pub gtol: Real,
    /// Keep per-axis scales at their initial estimate during refinement.
    pub fix_scale: bool,
    /// Jacobian assembly threads, 0 for automatic.
    pub num_threads: usize,
    pub verbose: bool,
}

impl Default for RigAlignConfig {
    fn default() -> Self {
        Self {
            validity_bound: align_core::DEFAULT_VALIDITY_BOUND,
            reference_camera: 0,
            min_correspondences: MIN_PROCRUSTES_POINTS,
            max_iters: 20,
            max_passes_without_improvement: 5,
            max_refine_passes: 50,
            min_cost: 1e-18,
            improvement_rel_tol: 1e-9,
            improvement_abs_tol: 1e-15,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
            fix_scale: false,
            num_threads: 0,
            verbose: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output / Export
// ─────────────────────────────────────────────────────────────────────────────

/// One ordered pair as reported to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecord {
    pub from: usize,
    pub to: usize,
    pub transform: PairTransform,
    pub status: PairStatus,
    pub stats: PairStats,
}

/// Result of the latest initialize or refine step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigAlignEstimate {
    pub phase: CalibrationPhase,
    pub reference_camera: usize,
    /// Best composed poses so far; `[c]` maps camera `c` into the reference frame.
    pub camera_to_reference: Vec<Mat4>,
    pub support: Vec<CameraSupport>,
    /// Total squared residual of `camera_to_reference`.
    pub cost: Real,
    pub pairs: Vec<PairRecord>,
    pub refine_passes: usize,
    pub last_report: Option<PairBundleReport>,
}

impl RigAlignEstimate {
    /// Summarize the state. `None` until a best pose set exists.
    pub fn from_state(state: &CalibrationState, last_report: Option<PairBundleReport>) -> Option<Self> {
        let best = state.best.as_ref()?;
        let pairs = state
            .pairs
            .iter()
            .map(|(from, to, entry)| PairRecord {
                from,
                to,
                transform: entry.transform,
                status: entry.status,
                stats: state.stats(from, to),
            })
            .collect();
        Some(Self {
            phase: state.phase,
            reference_camera: state.reference_camera,
            camera_to_reference: best.camera_to_reference.clone(),
            support: state.support.clone(),
            cost: best.cost,
            pairs,
            refine_passes: state.refine_passes,
            last_report,
        })
    }
}

/// Export format for rig alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigAlignExport {
    pub reference_camera: usize,
    pub camera_to_reference: Vec<Mat4>,
    pub support: Vec<CameraSupport>,
    /// Cameras with no evidence-backed chain to the reference.
    pub unsupported_cameras: Vec<usize>,
    /// Solved pairs only.
    pub pairs: Vec<PairRecord>,
    pub cost: Real,
    pub total_valid: usize,
    pub total_rejected: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// ProblemType
// ─────────────────────────────────────────────────────────────────────────────

/// Multi-camera rig alignment from shared characteristic points.
#[derive(Debug, Clone, Copy)]
pub struct RigAlignProblem;

impl ProblemType for RigAlignProblem {
    type Config = RigAlignConfig;
    type Input = RigAlignInput;
    type State = CalibrationState;
    type Output = RigAlignEstimate;
    type Export = RigAlignExport;

    fn name() -> &'static str {
        "rig_align"
    }

    fn validate_input(input: &Self::Input) -> Result<()> {
        ensure!(
            input.num_cameras() >= 2,
            "need at least 2 cameras for rig alignment (got {})",
            input.num_cameras()
        );
        Ok(())
    }

    fn validate_config(config: &Self::Config) -> Result<()> {
        ensure!(
            config.validity_bound.is_finite() && config.validity_bound > 0.0,
            "validity_bound must be positive and finite"
        );
        ensure!(
            config.min_correspondences >= MIN_PROCRUSTES_POINTS,
            "min_correspondences must be at least {}",
            MIN_PROCRUSTES_POINTS
        );
        ensure!(config.max_iters > 0, "max_iters must be positive");
        ensure!(config.min_cost >= 0.0, "min_cost must be non-negative");
        ensure!(
            config.improvement_rel_tol >= 0.0 && config.improvement_abs_tol >= 0.0,
            "improvement tolerances must be non-negative"
        );
        Ok(())
    }

    fn validate_input_config(input: &Self::Input, config: &Self::Config) -> Result<()> {
        ensure!(
            config.reference_camera < input.num_cameras(),
            "reference_camera {} is out of range (num_cameras = {})",
            config.reference_camera,
            input.num_cameras()
        );
        Ok(())
    }

    fn on_input_change() -> InvalidationPolicy {
        InvalidationPolicy::CLEAR_COMPUTED
    }

    fn export(output: &Self::Output, _config: &Self::Config) -> Result<Self::Export> {
        let unsupported_cameras = output
            .support
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_supported())
            .map(|(c, _)| c)
            .collect();

        Ok(RigAlignExport {
            reference_camera: output.reference_camera,
            camera_to_reference: output.camera_to_reference.clone(),
            support: output.support.clone(),
            unsupported_cameras,
            pairs: output
                .pairs
                .iter()
                .filter(|p| p.status.is_solved())
                .cloned()
                .collect(),
            cost: output.cost,
            total_valid: output.pairs.iter().map(|p| p.stats.valid).sum(),
            total_rejected: output.pairs.iter().map(|p| p.stats.rejected).sum(),
        })
    }
}
