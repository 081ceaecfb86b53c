//! Closed-form initialization for multi-camera point alignment.
//!
//! - [`procrustes`]: Umeyama similarity fit for one ordered pair.
//! - [`pair_init`]: runs the fit over every ordered pair with enough valid
//!   correspondences and reports the pairs left at their seed.
//! - [`spanning`]: chooses, per camera, the chain of pairs linking it to the
//!   reference camera and composes the global poses.

pub mod pair_init;
pub mod procrustes;
pub mod spanning;

pub use pair_init::{initialize_pairs, PairEstimate, PairInitResult, PairSkip, PairSkipReason};
pub use procrustes::{umeyama, ProcrustesError, Similarity, MIN_PROCRUSTES_POINTS};
pub use spanning::{
    maximum_spanning_tree, supported_fraction, CameraSupport, SpanningError, SpanningTree,
};

pub mod prelude {
    pub use crate::pair_init::*;
    pub use crate::procrustes::*;
    pub use crate::spanning::*;
}
