//! Generic calibration session framework.
//!
//! A [`CalibrationSession`] is a mutable container holding the config, the
//! embedded input, problem-specific intermediate state, one final output, the
//! exports generated from it and an operation log. Step functions take
//! `&mut CalibrationSession<P>` and advance it in place.
//!
//! ```no_run
//! use align_pipeline::session::CalibrationSession;
//! use align_pipeline::rig_align::{RigAlignInput, RigAlignProblem, step_initialize, step_match, step_refine};
//! # fn main() -> anyhow::Result<()> {
//! # let input: RigAlignInput = unimplemented!();
//! let mut session = CalibrationSession::<RigAlignProblem>::new();
//! session.set_input(input)?;
//!
//! step_match(&mut session)?;
//! step_initialize(&mut session, None)?;
//! step_refine(&mut session, None)?;
//!
//! let export = session.export()?;
//! # Ok(())
//! # }
//! ```

pub mod calibsession;
pub mod problem_type;
pub mod types;

pub use calibsession::CalibrationSession;
pub use problem_type::{InvalidationPolicy, ProblemType};
pub use types::{current_timestamp, ExportRecord, LogEntry, SessionMetadata};
