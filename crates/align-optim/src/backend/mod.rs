//! Backend adapters that compile the IR into solver-specific problems.
//!
//! Backends are responsible for translating the IR into a solver-native
//! problem, honoring fixed masks, and returning a solved parameter map.

mod dense_lm;

use anyhow::Result;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ir::ProblemIR;

pub use dense_lm::DenseLmBackend;

/// Backend-agnostic solver options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSolveOptions {
    /// Maximum number of outer solver iterations.
    pub max_iters: usize,
    /// Relative cost reduction tolerance.
    pub ftol: f64,
    /// Relative parameter update tolerance.
    pub xtol: f64,
    /// Gradient orthogonality tolerance.
    pub gtol: f64,
    /// Worker threads for Jacobian assembly (0 = rayon default).
    pub num_threads: usize,
    /// Log a per-solve summary.
    pub verbose: bool,
}

impl Default for BackendSolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 20,
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
            num_threads: 0,
            verbose: false,
        }
    }
}

/// Solver output from a backend.
///
/// The `params` map uses the IR parameter block names.
#[derive(Debug, Clone)]
pub struct BackendSolution {
    /// Optimized parameter vectors keyed by block name.
    pub params: HashMap<String, DVector<f64>>,
    /// Cost `½‖r‖²` at the initial parameters.
    pub initial_cost: f64,
    /// Cost `½‖r‖²` at the returned parameters.
    pub final_cost: f64,
    /// Outer solver iterations performed.
    pub iterations: usize,
    /// Residual evaluations performed.
    pub evaluations: usize,
    pub converged: bool,
}

/// Backend interface implemented by solver adapters.
pub trait OptimBackend {
    /// Solve a compiled IR with the provided initial parameters.
    fn solve(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
        opts: &BackendSolveOptions,
    ) -> Result<BackendSolution>;
}

/// Supported solver backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// Dense Levenberg–Marquardt with autodiff Jacobians.
    #[default]
    DenseLm,
}

/// Solve a problem using the selected backend.
///
/// This is the main backend-agnostic entry point used by problems.
pub fn solve_with_backend(
    backend: BackendKind,
    ir: &ProblemIR,
    initial: &HashMap<String, DVector<f64>>,
    opts: &BackendSolveOptions,
) -> Result<BackendSolution> {
    match backend {
        BackendKind::DenseLm => DenseLmBackend.solve(ir, initial, opts),
    }
}
