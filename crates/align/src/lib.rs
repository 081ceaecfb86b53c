//! Align the 3D observations of several fixed depth cameras into one frame.
//!
//! Every camera reports characteristic points keyed by a stable identifier.
//! Shared identifiers between two cameras give point correspondences; from
//! those the crate estimates, for every ordered camera pair, the transform
//! `p_to = scale ⊙ (R · p_from) + t`, and composes them into a pose of each
//! camera relative to a reference camera.
//!
//! ## Session API
//!
//! ```no_run
//! use align::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let rig = SyntheticRig::ring(4).with_noise(0.002, 7);
//! let mut session = CalibrationSession::<RigAlignProblem>::with_input(
//!     RigAlignInput::from_source(&rig)?,
//! )?;
//!
//! step_match(&mut session)?;
//! step_initialize(&mut session, None)?;
//! loop {
//!     let outcome = step_refine(&mut session, None)?;
//!     if outcome.stalled || outcome.cost_after < 1e-12 {
//!         break;
//!     }
//! }
//!
//! // Camera 2 into camera 0, recomposed lazily after each refine pass.
//! let t = session.state.transformation(2, 0)?;
//! println!("{t}");
//! # Ok(())
//! # }
//! ```
//!
//! A renderer on another thread can hold a
//! [`TransformHandle`](pipeline::rig_align::TransformHandle) from
//! `session.state.transform_handle()` and read consistent snapshots while the
//! session keeps refining.
//!
//! ## Building blocks
//!
//! - [`core`]: point sets, correspondences, validity filter, pair transforms,
//!   correspondence sources and the synthetic rig.
//! - [`linear`]: Umeyama initialization and the spanning-tree pose selection.
//! - [`optim`]: the joint refinement problem and its dense LM backend.
//! - [`pipeline`]: the session framework and the rig alignment steps.

pub use align_core as core;
pub use align_linear as linear;
pub use align_optim as optim;
pub use align_pipeline as pipeline;

/// Common imports for running a rig alignment.
pub mod prelude {
    pub use align_core::synthetic::SyntheticRig;
    pub use align_core::{
        CapturedPoints, CharacteristicPointSet, CorrespondenceSource, Mat4, PairTransform, Pt3,
        ValidityFilter,
    };
    pub use align_linear::CameraSupport;
    pub use align_pipeline::rig_align::{
        run_calibration, step_initialize, step_match, step_refine, CalibrationError,
        CalibrationPhase, RefineOutcome, RigAlignConfig, RigAlignExport, RigAlignInput,
        RigAlignProblem, TransformHandle,
    };
    pub use align_pipeline::session::CalibrationSession;
}
