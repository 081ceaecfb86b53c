//! Step functions for multi-camera rig alignment.
//!
//! Each step operates on `CalibrationSession<RigAlignProblem>` and checks the
//! calibration phase it needs before touching the state.

use align_core::{PairCorrespondences, Real, ValidityFilter};
use align_linear::{initialize_pairs, PairSkipReason};
use align_optim::{
    optimize_pair_bundle, BackendSolveOptions, PairBundleDataset, PairBundleReport,
    PairBundleSolveOptions, PairKey, PairObservations,
};
use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::session::CalibrationSession;

use super::error::CalibrationError;
use super::problem::{RigAlignEstimate, RigAlignProblem};
use super::state::{CalibrationPhase, PairStatus};

type Session = CalibrationSession<RigAlignProblem>;

// ─────────────────────────────────────────────────────────────────────────────
// Step Options
// ─────────────────────────────────────────────────────────────────────────────

/// Overrides for [`step_initialize`].
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub min_correspondences: Option<usize>,
}

/// Overrides for [`step_refine`].
#[derive(Debug, Clone, Default)]
pub struct RefineOptions {
    pub max_iters: Option<usize>,
    pub num_threads: Option<usize>,
    pub fix_scale: Option<bool>,
}

/// What one refine pass did to the best composed poses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefineOutcome {
    /// Cost dropped by more than the improvement tolerance.
    pub improved: bool,
    /// The pass result became the new best (cost not above the previous best).
    pub replaced_best: bool,
    /// Best cost before the pass.
    pub cost_before: Real,
    /// Cost of the poses composed from this pass.
    pub cost_after: Real,
    pub passes_since_improvement: usize,
    /// `passes_since_improvement` exceeds the configured bound.
    pub stalled: bool,
    pub report: PairBundleReport,
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Match and filter every ordered pair, replacing the stored correspondences.
fn rebuild_correspondences(session: &mut Session) -> Result<(usize, usize)> {
    session.validate()?;
    let input = session.require_input()?;
    let filter = ValidityFilter::new(session.config.validity_bound);
    let correspondences = PairCorrespondences::build(&input.point_sets, &filter);
    let num_cameras = input.num_cameras();

    let totals = (correspondences.total_valid(), correspondences.total_rejected());
    session
        .state
        .prepare(num_cameras, session.config.reference_camera);
    session
        .state
        .set_correspondences(correspondences, session.config.validity_bound);
    Ok(totals)
}

/// Rebuild correspondences that are missing (not persisted) or were built for
/// a different validity bound or reference camera than the current config.
fn ensure_correspondences(session: &mut Session) -> Result<()> {
    let config = &session.config;
    if session
        .state
        .is_stale(config.validity_bound, config.reference_camera)
    {
        debug!(
            "rebuilding correspondences for bound {} and reference camera {}",
            config.validity_bound, config.reference_camera
        );
        rebuild_correspondences(session)?;
    }
    Ok(())
}

fn fail(session: &mut Session, operation: &str, err: CalibrationError) -> anyhow::Error {
    warn!("{operation}: {err}");
    session.log_failure(operation, err.to_string());
    err.into()
}

fn refresh_output(session: &mut Session, report: Option<PairBundleReport>) -> Result<()> {
    let output = RigAlignEstimate::from_state(&session.state, report)
        .ok_or_else(|| anyhow!("no best transformations recorded"))?;
    session.set_output(output);
    Ok(())
}

fn warn_unsupported(session: &Session) {
    for (camera, support) in session.state.support.iter().enumerate() {
        if !support.is_supported() {
            warn!(
                "camera {} has no usable pair chain to reference camera {}; keeping identity",
                camera, session.state.reference_camera
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Step Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Match characteristic points between every ordered camera pair.
///
/// Filters correspondences with the configured validity bound and stores the
/// per-pair statistics in the state. Pair transforms are kept unless the
/// number of cameras changed.
pub fn step_match(session: &mut Session) -> Result<()> {
    let (valid, rejected) = rebuild_correspondences(session)?;
    let n = session.state.num_cameras();

    if session.config.verbose {
        info!(
            "matched {} cameras: {} valid correspondences, {} rejected by validity bound {}",
            n, valid, rejected, session.config.validity_bound
        );
    }
    session.log_success_with_notes(
        "match",
        format!("{} valid, {} rejected over {} pairs", valid, rejected, n * n.saturating_sub(1)),
    );
    Ok(())
}

/// Closed-form initialization of every pair with enough valid correspondences.
///
/// Pairs that cannot be solved keep their current transform. On success the
/// composed poses are offered as the best so far and the phase becomes
/// `Initialized`.
///
/// # Errors
///
/// - [`CalibrationError::NotInitializable`] if no pair could be solved; the
///   phase is left unchanged.
pub fn step_initialize(session: &mut Session, opts: Option<InitOptions>) -> Result<()> {
    session.validate()?;
    ensure_correspondences(session)?;

    let opts = opts.unwrap_or_default();
    let required = opts
        .min_correspondences
        .unwrap_or(session.config.min_correspondences);

    let init = {
        let correspondences = session
            .state
            .correspondences()
            .ok_or(CalibrationError::NoCorrespondences)?;
        initialize_pairs(correspondences, required)
    };

    for skip in &init.skipped {
        if let PairSkipReason::Failed(err) = &skip.reason {
            warn!("pair {}->{} keeps its seed: {}", skip.from, skip.to, err);
        }
    }

    if init.is_empty() {
        let n = session.state.num_cameras();
        let err = CalibrationError::NotInitializable {
            pairs_tried: n * n.saturating_sub(1),
        };
        return Err(fail(session, "initialize", err));
    }

    for estimate in &init.estimates {
        session.state.set_pair(
            estimate.from,
            estimate.to,
            estimate.transform,
            PairStatus::Initialized,
        )?;
    }
    session.state.phase = CalibrationPhase::Initialized;
    session.state.passes_without_improvement = 0;

    let snapshot = session.state.refresh()?;
    let cost = session.state.total_cost()?;
    session.state.last_cost = Some(cost);
    let replaced = session
        .state
        .offer_best(snapshot.camera_to_reference.clone(), cost);
    if !replaced {
        debug!("re-initialization cost {:.3e} does not beat the best so far", cost);
    }
    warn_unsupported(session);

    if session.config.verbose {
        info!(
            "initialized {} pairs ({} skipped), total cost {:.6e}",
            init.estimates.len(),
            init.skipped.len(),
            cost
        );
    }

    refresh_output(session, None)?;
    session.log_success_with_notes(
        "initialize",
        format!(
            "{} pairs initialized, {} skipped, cost={:.3e}",
            init.estimates.len(),
            init.skipped.len(),
            cost
        ),
    );
    Ok(())
}

/// One joint refinement pass over all solved pairs.
///
/// The problem is rebuilt from the current pair transforms. The refined
/// poses replace the best so far only if their total cost does not exceed it.
///
/// # Errors
///
/// - [`CalibrationError::NotInitialized`] before a successful [`step_initialize`].
/// - [`CalibrationError::EmptyProblem`] if no solved pair has enough
///   correspondences.
pub fn step_refine(session: &mut Session, opts: Option<RefineOptions>) -> Result<RefineOutcome> {
    session.validate()?;
    if !session.state.is_initialized() {
        return Err(fail(session, "refine", CalibrationError::NotInitialized));
    }
    ensure_correspondences(session)?;

    let opts = opts.unwrap_or_default();
    let config = session.config.clone();
    let required = config.min_correspondences;

    let (dataset, seeds) = {
        let state = &session.state;
        let correspondences = state
            .correspondences()
            .ok_or(CalibrationError::NoCorrespondences)?;

        let mut observations = Vec::new();
        let mut seeds: BTreeMap<PairKey, _> = BTreeMap::new();
        for (from, to, entry) in state.pairs.iter() {
            if !entry.status.is_solved() {
                continue;
            }
            let Some(corr) = correspondences.get(from, to) else {
                continue;
            };
            if corr.len() < required {
                continue;
            }
            observations.push(PairObservations::new(
                from,
                to,
                corr.from_points.clone(),
                corr.to_points.clone(),
            )?);
            seeds.insert((from, to), entry.transform);
        }
        (PairBundleDataset::new(observations)?, seeds)
    };

    if dataset.pairs.is_empty() {
        return Err(fail(session, "refine", CalibrationError::EmptyProblem { required }));
    }

    let solve_opts = PairBundleSolveOptions {
        min_correspondences: required,
        fix_scale: opts.fix_scale.unwrap_or(config.fix_scale),
    };
    let backend_opts = BackendSolveOptions {
        max_iters: opts.max_iters.unwrap_or(config.max_iters),
        ftol: config.ftol,
        xtol: config.xtol,
        gtol: config.gtol,
        num_threads: opts.num_threads.unwrap_or(config.num_threads),
        verbose: config.verbose,
    };

    let result = match optimize_pair_bundle(&dataset, &seeds, &solve_opts, &backend_opts) {
        Ok(r) => r,
        Err(e) => {
            session.log_failure("refine", e.to_string());
            return Err(e);
        }
    };

    for (&(from, to), transform) in &result.refined {
        session
            .state
            .set_pair(from, to, *transform, PairStatus::Refined)?;
    }
    session.state.phase = CalibrationPhase::Refined;
    session.state.refine_passes += 1;

    let snapshot = session.state.refresh()?;
    let cost_after = session.state.total_cost()?;
    session.state.last_cost = Some(cost_after);

    let cost_before = session.state.best.as_ref().map(|b| b.cost);
    let improved = match cost_before {
        Some(best) => {
            let margin = config
                .improvement_abs_tol
                .max(config.improvement_rel_tol * best);
            cost_after < best - margin
        }
        None => true,
    };
    let replaced_best = session
        .state
        .offer_best(snapshot.camera_to_reference.clone(), cost_after);

    if improved {
        session.state.passes_without_improvement = 0;
    } else {
        session.state.passes_without_improvement += 1;
    }
    let passes_since_improvement = session.state.passes_without_improvement;
    let stalled = passes_since_improvement > config.max_passes_without_improvement;

    let cost_before = cost_before.unwrap_or(Real::INFINITY);
    debug!(
        "refine pass {}: cost {:.6e} -> {:.6e}, improved={}, replaced_best={}",
        session.state.refine_passes, cost_before, cost_after, improved, replaced_best
    );
    if config.verbose {
        info!(
            "refine pass {}: {} pairs, {} correspondences, best cost {:.6e}",
            session.state.refine_passes,
            result.report.num_pairs,
            result.report.num_residuals,
            cost_after.min(cost_before)
        );
    }
    if stalled {
        warn!(
            "no improvement for {} refine passes",
            passes_since_improvement
        );
    }

    refresh_output(session, Some(result.report.clone()))?;
    session.log_success_with_notes(
        "refine",
        format!(
            "pass {}: cost {:.3e} -> {:.3e}",
            session.state.refine_passes, cost_before, cost_after
        ),
    );

    Ok(RefineOutcome {
        improved,
        replaced_best,
        cost_before,
        cost_after,
        passes_since_improvement,
        stalled,
        report: result.report,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipeline Function
// ─────────────────────────────────────────────────────────────────────────────

/// Match, initialize, then refine until the best cost is small enough, the
/// passes stall, or `max_refine_passes` is reached.
pub fn run_calibration(session: &mut Session) -> Result<()> {
    step_match(session)?;
    step_initialize(session, None)?;

    let max_passes = session.config.max_refine_passes;
    let min_cost = session.config.min_cost;
    for _ in 0..max_passes {
        if session.state.best.as_ref().is_some_and(|b| b.cost <= min_cost) {
            debug!("best cost at or below {:.1e}, stopping", min_cost);
            break;
        }
        if step_refine(session, None)?.stalled {
            break;
        }
    }

    if session.config.verbose {
        if let Some(best) = &session.state.best {
            info!(
                "calibration finished after {} refine passes, cost {:.6e}",
                session.state.refine_passes, best.cost
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig_align::RigAlignInput;
    use align_core::math::invert_affine;
    use align_core::synthetic::SyntheticRig;
    use align_core::{CharacteristicPointSet, Mat4, PairStats, PairTransform, Pt3};
    use align_linear::CameraSupport;
    use std::f64::consts::FRAC_PI_2;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn point_set(points: &[[f64; 3]]) -> CharacteristicPointSet {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| (i as i64, Pt3::new(p[0], p[1], p[2])))
            .collect()
    }

    /// Camera 1 sees camera 0's points rotated 90° about z and shifted by (1, 0, 0).
    fn quarter_turn_input() -> RigAlignInput {
        let cam0 = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let cam1: Vec<[f64; 3]> = cam0.iter().map(|p| [1.0 - p[1], p[0], p[2]]).collect();
        RigAlignInput::new(vec![point_set(&cam0), point_set(&cam1)])
    }

    fn quarter_turn() -> PairTransform {
        PairTransform {
            rotation: [0.0, 0.0, FRAC_PI_2],
            translation: [1.0, 0.0, 0.0],
            scale: [1.0; 3],
        }
    }

    fn max_abs_diff(a: &Mat4, b: &Mat4) -> f64 {
        (a - b).abs().max()
    }

    #[test]
    fn refine_before_init_is_not_initialized() {
        init_logging();
        let mut session = Session::with_input(quarter_turn_input()).unwrap();
        step_match(&mut session).unwrap();

        let err = step_refine(&mut session, None).unwrap_err();
        assert_eq!(
            err.downcast_ref::<CalibrationError>(),
            Some(&CalibrationError::NotInitialized)
        );
        assert!(!session.log.last().unwrap().success);
    }

    #[test]
    fn steps_require_input() {
        let mut session = Session::new();
        assert!(step_match(&mut session).is_err());
        assert!(step_initialize(&mut session, None).is_err());
    }

    #[test]
    fn initialize_without_overlap_is_not_initializable() {
        init_logging();
        let a = point_set(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let b: CharacteristicPointSet = [(10, Pt3::new(0.0, 0.0, 1.0))].into_iter().collect();
        let mut session = Session::with_input(RigAlignInput::new(vec![a, b])).unwrap();

        let err = step_initialize(&mut session, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CalibrationError>(),
            Some(CalibrationError::NotInitializable { pairs_tried: 2 })
        ));
        assert_eq!(session.state.phase, CalibrationPhase::Uninitialized);
        assert!(!session.has_output());
    }

    #[test]
    fn quarter_turn_scenario() {
        init_logging();
        let mut session = Session::with_input(quarter_turn_input()).unwrap();
        step_match(&mut session).unwrap();
        step_initialize(&mut session, None).unwrap();
        step_refine(&mut session, None).unwrap();

        let expected = quarter_turn().to_matrix();
        let refined = session.state.pairs.get(0, 1).unwrap();
        assert_eq!(refined.status, PairStatus::Refined);
        let diff = max_abs_diff(&refined.transform.to_matrix(), &expected);
        assert!(diff < 1e-6, "pair 0->1 off by {diff}");

        let composed = session.state.transformation(1, 0).unwrap();
        let inverse = invert_affine(&expected).unwrap();
        let diff = max_abs_diff(&composed, &inverse);
        assert!(diff < 1e-6, "T(1,0) off by {diff}");

        let export = session.export().unwrap();
        assert_eq!(export.pairs.len(), 2);
        assert!(export.unsupported_cameras.is_empty());
        assert_eq!(export.total_valid, 8);
    }

    #[test]
    fn disconnected_camera_keeps_identity() {
        init_logging();
        let mut input = quarter_turn_input();
        let lonely: CharacteristicPointSet = [(99, Pt3::new(5.0, 5.0, 5.0))].into_iter().collect();
        input.point_sets.push(lonely);
        let mut session = Session::with_input(input).unwrap();
        run_calibration(&mut session).unwrap();

        assert_eq!(session.state.support[2], CameraSupport::Disconnected);
        assert_eq!(session.state.transformation(2, 0).unwrap(), Mat4::identity());
        for other in [0, 1] {
            assert_eq!(session.state.pairs.get(2, other).unwrap().status, PairStatus::Seed);
        }
        let export = session.export().unwrap();
        assert_eq!(export.unsupported_cameras, vec![2]);
    }

    #[test]
    fn best_cost_never_increases() {
        init_logging();
        let rig = SyntheticRig::ring(4).with_noise(0.003, 11);
        let mut session = Session::with_input(RigAlignInput::from_source(&rig).unwrap()).unwrap();
        step_match(&mut session).unwrap();
        step_initialize(&mut session, None).unwrap();

        let mut best = session.state.best.as_ref().unwrap().cost;
        for _ in 0..4 {
            let outcome = step_refine(&mut session, None).unwrap();
            let now = session.state.best.as_ref().unwrap().cost;
            assert!(now <= best, "best cost rose from {best} to {now}");
            assert_eq!(outcome.replaced_best, outcome.cost_after <= best);
            best = now;
        }
    }

    #[test]
    fn set_input_clears_state() {
        init_logging();
        let mut session = Session::with_input(quarter_turn_input()).unwrap();
        run_calibration(&mut session).unwrap();
        assert!(session.state.is_initialized());

        session.set_input(quarter_turn_input()).unwrap();
        assert_eq!(session.state.phase, CalibrationPhase::Uninitialized);
        assert!(session.state.best.is_none());
        assert!(!session.has_output());
    }

    #[test]
    fn stalls_after_configured_passes() {
        init_logging();
        let mut session = Session::with_input(quarter_turn_input()).unwrap();
        session.config.max_passes_without_improvement = 1;
        step_match(&mut session).unwrap();
        step_initialize(&mut session, None).unwrap();

        let first = step_refine(&mut session, None).unwrap();
        assert!(!first.improved);
        assert!(!first.stalled);
        let second = step_refine(&mut session, None).unwrap();
        assert_eq!(second.passes_since_improvement, 2);
        assert!(second.stalled);
    }

    #[test]
    fn config_change_rebuilds_matches_and_reference() {
        init_logging();
        let mut input = quarter_turn_input();
        input.point_sets[0].insert(4, Pt3::new(5.0, 0.0, 0.0));
        input.point_sets[1].insert(4, Pt3::new(1.0, 5.0, 0.0));
        let mut session = Session::with_input(input).unwrap();
        step_match(&mut session).unwrap();
        assert_eq!(session.state.stats(0, 1).rejected, 0);

        session
            .update_config(|c| {
                c.validity_bound = 4.0;
                c.reference_camera = 1;
            })
            .unwrap();
        step_initialize(&mut session, None).unwrap();

        assert_eq!(
            session.state.stats(0, 1),
            PairStats {
                shared: 5,
                valid: 4,
                rejected: 1
            }
        );
        assert_eq!(session.state.reference_camera, 1);

        let export = session.export().unwrap();
        assert_eq!(export.reference_camera, 1);
        assert_eq!(export.total_rejected, 2);
        assert_eq!(export.camera_to_reference[1], Mat4::identity());
        let diff = max_abs_diff(&export.camera_to_reference[0], &quarter_turn().to_matrix());
        assert!(diff < 1e-9, "camera 0 pose off by {diff}");
    }

    #[test]
    fn solver_config_change_keeps_progress() {
        init_logging();
        let mut session = Session::with_input(quarter_turn_input()).unwrap();
        step_match(&mut session).unwrap();
        step_initialize(&mut session, None).unwrap();
        step_refine(&mut session, None).unwrap();
        let best = session.state.best.clone();

        session.update_config(|c| c.max_iters = 5).unwrap();
        assert_eq!(session.state.best, best);
        step_refine(&mut session, None).unwrap();
        assert_eq!(session.state.refine_passes, 2);
        assert_eq!(session.state.passes_without_improvement, 2);
    }
}
