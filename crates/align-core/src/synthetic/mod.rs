//! Deterministic synthetic rig generation.
//!
//! Used by tests and the command line front end to exercise the same
//! initialize/refine pipeline as captured data:
//! - a fixed 3D point lattice expressed in the reference camera frame,
//! - known ground-truth camera-to-reference transforms,
//! - a deterministic visibility rule giving partial overlap between cameras,
//! - optional seeded noise and injected invalid points.
//!
//! # Example
//!
//! ```no_run
//! use align_core::{synthetic::SyntheticRig, CorrespondenceSource};
//!
//! let rig = SyntheticRig::ring(4);
//! let sets = rig.point_sets().unwrap();
//! assert_eq!(sets.len(), 4);
//! ```

mod rig;

pub use rig::SyntheticRig;
