use align_core::Real;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Generic non-linear least squares problem with dense parameter/residual vectors.
///
/// All residual rows carry equal weight; the solver minimizes `½‖r(x)‖²`.
pub trait NllsProblem {
    /// Number of parameters in the optimization vector.
    fn num_params(&self) -> usize;
    /// Number of residual rows in the problem.
    fn num_residuals(&self) -> usize;

    /// Residuals for the current parameters.
    fn residuals(&self, x: &DVector<Real>) -> DVector<Real>;
    /// Jacobian of [`NllsProblem::residuals`] for the current parameters.
    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real>;

    /// Sum of squared residuals.
    fn cost(&self, x: &DVector<Real>) -> Real {
        self.residuals(x).norm_squared()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveOptions {
    /// Maximum number of outer solver iterations (Jacobian evaluations).
    pub max_iters: usize,
    /// Relative tolerance on the objective (cost) reduction.
    pub ftol: Real,
    /// Orthogonality/gradient tolerance.
    pub gtol: Real,
    /// Relative tolerance on parameter updates.
    pub xtol: Real,
    /// Enable per-solve summary logging.
    pub verbose: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 20,
            ftol: 1e-12,
            gtol: 1e-12,
            xtol: 1e-12,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    /// Outer iterations performed.
    pub iterations: usize,
    /// Residual evaluations performed, including rejected steps.
    pub evaluations: usize,
    /// Cost `½‖r‖²` at the returned parameters.
    pub final_cost: Real,
    /// A convergence tolerance was met; `false` when the iteration cap stopped the solve.
    pub converged: bool,
}

pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}
