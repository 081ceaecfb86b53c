//! Session-based pipeline for multi-camera point alignment.
//!
//! - [`session`]: generic calibration session container with validation,
//!   invalidation policies, an operation log, exports and JSON persistence.
//! - [`rig_align`]: the rig alignment problem, its state machine and the
//!   step functions driving it.

pub mod rig_align;
pub mod session;

pub use rig_align::{
    run_calibration, step_initialize, step_match, step_refine, CalibrationError,
    CalibrationPhase, CalibrationState, RefineOutcome, RigAlignConfig, RigAlignExport,
    RigAlignInput, RigAlignProblem, TransformHandle, TransformSnapshot,
};
pub use session::{CalibrationSession, ProblemType};
