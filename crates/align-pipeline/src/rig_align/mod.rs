//! Multi-camera rig alignment from shared characteristic points.
//!
//! # Pipeline
//!
//! 1. **Match** ([`step_match`]): correspondences for every ordered camera
//!    pair, filtered by the validity bound, with per-pair statistics.
//! 2. **Initialize** ([`step_initialize`]): closed-form similarity for every
//!    pair with enough valid correspondences.
//! 3. **Refine** ([`step_refine`]): one joint least-squares pass over all
//!    solved pairs; repeat until the outcome reports `stalled`.
//!
//! Refinement only sees pairs that initialization solved and that still have
//! `min_correspondences` valid correspondences. Every pair owns an independent
//! 9-parameter block, so a pair with one or two correspondences would leave
//! its block under-determined and make the whole dense solve rank deficient,
//! and a pair whose closed-form fit failed has only the identity seed to start
//! from. Such pairs keep their seed and do not take part in pose composition.
//!
//! Changing `validity_bound` or `reference_camera` in the config makes the
//! next step rebuild the correspondences and drop the best poses; solver
//! settings can change between passes without losing progress.
//!
//! [`run_calibration`] chains the three.
//!
//! # Conventions
//!
//! - A pair transform `(from, to)` maps points of camera `from` into camera
//!   `to`: `p_to = scale ⊙ (R · p_from) + t`.
//! - `camera_to_reference[c]` maps camera `c` into the reference camera's
//!   frame. It is composed along a maximum spanning tree of the pair graph
//!   weighted by valid correspondence counts.
//! - [`CalibrationState::transformation`]`(from, to)` is
//!   `camera_to_reference[to]⁻¹ · camera_to_reference[from]`, recomposed
//!   lazily after pair updates.
//! - Cameras without a chain of solved pairs to the reference keep the
//!   identity and are reported as [`CameraSupport::Disconnected`](align_linear::CameraSupport).
//!
//! # Example
//!
//! ```no_run
//! use align_core::synthetic::SyntheticRig;
//! use align_pipeline::rig_align::{run_calibration, RigAlignInput, RigAlignProblem};
//! use align_pipeline::session::CalibrationSession;
//! # fn main() -> anyhow::Result<()> {
//! let input = RigAlignInput::from_source(&SyntheticRig::ring(4))?;
//! let mut session = CalibrationSession::<RigAlignProblem>::with_input(input)?;
//! run_calibration(&mut session)?;
//!
//! let t_2_to_0 = session.state.transformation(2, 0)?;
//! let export = session.export()?;
//! # Ok(())
//! # }
//! ```

mod cache;
mod error;
mod problem;
mod state;
mod steps;

pub use cache::{TransformCache, TransformHandle, TransformSnapshot};
pub use error::CalibrationError;
pub use problem::{
    PairRecord, RigAlignConfig, RigAlignEstimate, RigAlignExport, RigAlignInput, RigAlignProblem,
};
pub use state::{
    BestTransformations, CalibrationPhase, CalibrationState, PairEntry, PairGrid, PairStatus,
};
pub use steps::{
    run_calibration, step_initialize, step_match, step_refine, InitOptions, RefineOptions,
    RefineOutcome,
};
