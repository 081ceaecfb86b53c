//! Non-linear refinement of pairwise camera transforms.
//!
//! Problems are described in a backend-independent IR ([`ir`]) of parameter
//! blocks and residual blocks, then compiled by a backend ([`backend`]) into a
//! dense least-squares problem solved with Levenberg–Marquardt. Residual
//! Jacobians come from forward-mode autodiff (`num-dual`) per residual block,
//! optionally assembled on a fixed-size rayon pool (feature `parallel`).

pub mod backend;
mod backend_lm;
pub mod factors;
pub mod ir;
mod jacobian_ad;
pub mod params;
pub mod problems;
mod traits;

pub use crate::backend::{
    solve_with_backend, BackendKind, BackendSolution, BackendSolveOptions, DenseLmBackend,
    OptimBackend,
};
pub use crate::backend_lm::LmBackend;
pub use crate::problems::pair_bundle::{
    build_pair_bundle_ir, optimize_pair_bundle, pair_param_name, PairBundleDataset,
    PairBundleReport, PairBundleResult, PairBundleSolveOptions, PairKey, PairObservations,
};
pub use crate::traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
