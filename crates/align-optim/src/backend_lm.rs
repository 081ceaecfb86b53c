//! Dense Levenberg–Marquardt driver for [`NllsProblem`]s.
//!
//! Wraps the `levenberg-marquardt` crate, which solves each damped step with a
//! dense QR factorization of the stacked Jacobian.
//!
//! The crate itself only bounds function evaluations. The outer iteration cap
//! is enforced here: every outer LM iteration evaluates the Jacobian exactly
//! once, at the last accepted parameters, so the wrapper refuses the Jacobian
//! request that would start iteration `max_iters + 1`.

use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
use align_core::Real;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};
use std::cell::Cell;

/// Evaluation budget per outer iteration handed to the crate, in units of `n + 1`.
const EVALUATIONS_PER_ITERATION: usize = 10;

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<Real>,
    max_iters: usize,
    /// Jacobian evaluations, one per outer iteration.
    iterations: Cell<usize>,
    capped: Cell<bool>,
}

impl<P: NllsProblem> LeastSquaresProblem<Real, Dyn, Dyn> for LmWrapper<'_, P> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<Real> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        let r = self.problem.residuals(&self.params);
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        let done = self.iterations.get();
        if done >= self.max_iters {
            self.capped.set(true);
            return None;
        }
        self.iterations.set(done + 1);
        let j = self.problem.jacobian(&self.params);
        j.iter().all(|v| v.is_finite()).then_some(j)
    }
}

#[derive(Debug, Default, Clone)]
pub struct LmBackend;

impl NllsSolverBackend for LmBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport) {
        let max_iters = opts.max_iters.max(1);
        let lm = LevenbergMarquardt::new()
            .with_ftol(opts.ftol)
            .with_xtol(opts.xtol)
            .with_gtol(opts.gtol)
            .with_patience(max_iters.saturating_mul(EVALUATIONS_PER_ITERATION));

        let wrapper = LmWrapper {
            problem,
            params: x0,
            max_iters,
            iterations: Cell::new(0),
            capped: Cell::new(false),
        };

        let (wrapper, report) = lm.minimize(wrapper);
        let x_opt = wrapper.params();
        let iterations = wrapper.iterations.get();
        let capped = wrapper.capped.get();
        // A refused Jacobian ends the run through the crate's error path.
        let final_cost = 0.5 * problem.residuals(&x_opt).norm_squared();

        if opts.verbose {
            debug!(
                "lm: {} params, {} residuals, {} iterations ({} evaluations), cost {:.6e}, {}",
                problem.num_params(),
                problem.num_residuals(),
                iterations,
                report.number_of_evaluations,
                final_cost,
                if capped {
                    "iteration cap reached".to_string()
                } else {
                    format!("{:?}", report.termination)
                }
            );
        }

        (
            x_opt,
            SolveReport {
                iterations,
                evaluations: report.number_of_evaluations,
                final_cost,
                converged: !capped && report.termination.was_successful(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::LmBackend;
    use crate::{NllsProblem, NllsSolverBackend, SolveOptions};
    use align_core::Real;
    use nalgebra::{DMatrix, DVector};

    /// Fit `y = a·x + b` to exact samples.
    #[derive(Debug)]
    struct LineFit {
        xs: Vec<Real>,
        ys: Vec<Real>,
    }

    impl NllsProblem for LineFit {
        fn num_params(&self) -> usize {
            2
        }

        fn num_residuals(&self) -> usize {
            self.xs.len()
        }

        fn residuals(&self, p: &DVector<Real>) -> DVector<Real> {
            DVector::from_iterator(
                self.xs.len(),
                self.xs
                    .iter()
                    .zip(&self.ys)
                    .map(|(x, y)| p[0] * x + p[1] - y),
            )
        }

        fn jacobian(&self, _p: &DVector<Real>) -> DMatrix<Real> {
            DMatrix::from_fn(self.xs.len(), 2, |r, c| if c == 0 { self.xs[r] } else { 1.0 })
        }
    }

    #[test]
    fn lm_backend_fits_line() {
        let problem = LineFit {
            xs: vec![0.0, 1.0, 2.0, 3.0],
            ys: vec![1.0, 3.0, 5.0, 7.0],
        };
        let (x_opt, report) =
            LmBackend.solve(&problem, DVector::from_vec(vec![0.0, 0.0]), &SolveOptions::default());

        assert!(
            (x_opt[0] - 2.0).abs() < 1e-8 && (x_opt[1] - 1.0).abs() < 1e-8,
            "expected (2, 1), got ({}, {})",
            x_opt[0],
            x_opt[1]
        );
        assert!(report.final_cost < 1e-12, "final cost too high: {}", report.final_cost);
        assert!(
            report.converged,
            "LM backend did not report convergence: {:?}",
            report
        );
        assert!(report.iterations > 0 && report.iterations <= 20);
        assert!(report.evaluations >= report.iterations);
    }

    /// Rosenbrock in least-squares form, minimum at (1, 1).
    #[derive(Debug)]
    struct Rosenbrock;

    impl NllsProblem for Rosenbrock {
        fn num_params(&self) -> usize {
            2
        }

        fn num_residuals(&self) -> usize {
            2
        }

        fn residuals(&self, p: &DVector<Real>) -> DVector<Real> {
            DVector::from_vec(vec![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]])
        }

        fn jacobian(&self, p: &DVector<Real>) -> DMatrix<Real> {
            DMatrix::from_row_slice(2, 2, &[-20.0 * p[0], 10.0, -1.0, 0.0])
        }
    }

    #[test]
    fn iteration_cap_stops_the_solve() {
        let x0 = DVector::from_vec(vec![-1.2, 1.0]);
        let capped_opts = SolveOptions {
            max_iters: 1,
            ..SolveOptions::default()
        };
        let (x_capped, capped) = LmBackend.solve(&Rosenbrock, x0.clone(), &capped_opts);

        assert_eq!(capped.iterations, 1);
        assert!(!capped.converged, "{capped:?}");
        assert!(capped.final_cost > 1e-3, "one step reached {}", capped.final_cost);
        let expected = 0.5 * Rosenbrock.residuals(&x_capped).norm_squared();
        assert!((capped.final_cost - expected).abs() <= 1e-12 * expected.max(1.0));

        let free_opts = SolveOptions {
            max_iters: 500,
            ..SolveOptions::default()
        };
        let (x_free, free) = LmBackend.solve(&Rosenbrock, x0, &free_opts);
        assert!(free.iterations > 1);
        assert!(free.final_cost < capped.final_cost);
        assert!((x_free[0] - 1.0).abs() < 1e-6 && (x_free[1] - 1.0).abs() < 1e-6);
    }
}
