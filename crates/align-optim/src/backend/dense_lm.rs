use crate::backend::{BackendSolution, BackendSolveOptions, OptimBackend};
use crate::backend_lm::LmBackend;
use crate::factors::point_correspondence_residual;
use crate::ir::{FactorKind, ProblemIR};
use crate::jacobian_ad::{correspondence_block_jacobian, BLOCK_ROWS, LOCAL_DIM};
use crate::{NllsProblem, NllsSolverBackend, SolveOptions};
use anyhow::{anyhow, ensure, Result};
use log::debug;
use nalgebra::{DMatrix, DVector, SMatrix, SVector};
use std::collections::HashMap;

/// Dense Levenberg–Marquardt backend adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseLmBackend;

#[derive(Debug)]
struct CompiledParam {
    name: String,
    /// Current values, fixed entries included.
    base: SVector<f64, LOCAL_DIM>,
    /// Local indices that are optimized.
    free: Vec<usize>,
    /// Offset of the first free entry in the solver vector.
    x_offset: usize,
}

#[derive(Debug)]
struct CompiledResidual {
    param: usize,
    from: [f64; 3],
    to: [f64; 3],
}

/// IR compiled into a dense problem over the free parameters.
struct CompiledProblem {
    params: Vec<CompiledParam>,
    residuals: Vec<CompiledResidual>,
    num_free: usize,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

type BlockEval = (SVector<f64, BLOCK_ROWS>, SMatrix<f64, BLOCK_ROWS, LOCAL_DIM>);

impl CompiledProblem {
    fn compile(
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
        opts: &BackendSolveOptions,
    ) -> Result<Self> {
        ir.validate()?;

        let mut params = Vec::with_capacity(ir.params.len());
        let mut x_offset = 0;
        for param in &ir.params {
            let init = initial.get(&param.name).ok_or_else(|| {
                anyhow!(
                    "initial values missing parameter {} (id {:?})",
                    param.name,
                    param.id
                )
            })?;
            ensure!(
                init.len() == param.dim && param.dim == LOCAL_DIM,
                "initial dimension mismatch for {}: expected {}, got {}",
                param.name,
                LOCAL_DIM,
                init.len()
            );
            let free: Vec<usize> = (0..param.dim).filter(|i| !param.fixed.is_fixed(*i)).collect();
            let offset = x_offset;
            x_offset += free.len();
            params.push(CompiledParam {
                name: param.name.clone(),
                base: SVector::<f64, LOCAL_DIM>::from_iterator(init.iter().copied()),
                free,
                x_offset: offset,
            });
        }

        let residuals = ir
            .residuals
            .iter()
            .map(|block| match &block.factor {
                FactorKind::PointCorrespondence { from, to } => CompiledResidual {
                    param: block.params[0].0,
                    from: *from,
                    to: *to,
                },
            })
            .collect();

        #[cfg(feature = "parallel")]
        let pool = if opts.num_threads > 0 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(opts.num_threads)
                    .build()
                    .map_err(|e| anyhow!("failed to build solver thread pool: {e}"))?,
            )
        } else {
            None
        };
        #[cfg(not(feature = "parallel"))]
        if opts.num_threads > 1 {
            debug!(
                "num_threads = {} ignored: built without the parallel feature",
                opts.num_threads
            );
        }

        Ok(Self {
            params,
            residuals,
            num_free: x_offset,
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    fn initial_x(&self) -> DVector<f64> {
        let mut x = DVector::zeros(self.num_free);
        for param in &self.params {
            for (k, &local) in param.free.iter().enumerate() {
                x[param.x_offset + k] = param.base[local];
            }
        }
        x
    }

    fn local_params(&self, param: usize, x: &DVector<f64>) -> SVector<f64, LOCAL_DIM> {
        let param = &self.params[param];
        let mut local = param.base;
        for (k, &idx) in param.free.iter().enumerate() {
            local[idx] = x[param.x_offset + k];
        }
        local
    }

    fn eval_block(&self, block: &CompiledResidual, x: &DVector<f64>) -> BlockEval {
        let local = self.local_params(block.param, x);
        correspondence_block_jacobian(&local, block.from, block.to)
    }

    /// Evaluate every block; output order always matches `self.residuals`.
    fn eval_blocks(&self, x: &DVector<f64>) -> Vec<BlockEval> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            let run = || {
                self.residuals
                    .par_iter()
                    .map(|block| self.eval_block(block, x))
                    .collect()
            };
            match &self.pool {
                Some(pool) => pool.install(run),
                None => run(),
            }
        }
        #[cfg(not(feature = "parallel"))]
        {
            self.residuals
                .iter()
                .map(|block| self.eval_block(block, x))
                .collect()
        }
    }

    fn solution_map(&self, x: &DVector<f64>) -> HashMap<String, DVector<f64>> {
        self.params
            .iter()
            .enumerate()
            .map(|(idx, param)| {
                let local = self.local_params(idx, x);
                (param.name.clone(), DVector::from_column_slice(local.as_slice()))
            })
            .collect()
    }
}

impl NllsProblem for CompiledProblem {
    fn num_params(&self) -> usize {
        self.num_free
    }

    fn num_residuals(&self) -> usize {
        self.residuals.len() * BLOCK_ROWS
    }

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut r = DVector::zeros(self.num_residuals());
        for (i, block) in self.residuals.iter().enumerate() {
            let local = self.local_params(block.param, x);
            let rb = point_correspondence_residual(local.as_slice(), block.from, block.to);
            r.fixed_rows_mut::<BLOCK_ROWS>(i * BLOCK_ROWS).copy_from(&rb);
        }
        r
    }

    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut j = DMatrix::zeros(self.num_residuals(), self.num_free);
        for (i, (block, (_, j_local))) in self
            .residuals
            .iter()
            .zip(self.eval_blocks(x))
            .enumerate()
        {
            let param = &self.params[block.param];
            let row = i * BLOCK_ROWS;
            for (k, &local_col) in param.free.iter().enumerate() {
                for r in 0..BLOCK_ROWS {
                    j[(row + r, param.x_offset + k)] = j_local[(r, local_col)];
                }
            }
        }
        j
    }
}

impl OptimBackend for DenseLmBackend {
    fn solve(
        &self,
        ir: &ProblemIR,
        initial: &HashMap<String, DVector<f64>>,
        opts: &BackendSolveOptions,
    ) -> Result<BackendSolution> {
        let problem = CompiledProblem::compile(ir, initial, opts)?;
        let x0 = problem.initial_x();
        let initial_cost = 0.5 * problem.cost(&x0);

        if problem.num_free == 0 || problem.residuals.is_empty() {
            debug!("dense lm: nothing to optimize");
            return Ok(BackendSolution {
                params: problem.solution_map(&x0),
                initial_cost,
                final_cost: initial_cost,
                iterations: 0,
                evaluations: 0,
                converged: true,
            });
        }
        ensure!(
            problem.num_residuals() >= problem.num_free,
            "under-determined problem: {} residual rows for {} free parameters",
            problem.num_residuals(),
            problem.num_free
        );

        let solve_opts = SolveOptions {
            max_iters: opts.max_iters,
            ftol: opts.ftol,
            gtol: opts.gtol,
            xtol: opts.xtol,
            verbose: opts.verbose,
        };
        let (x_opt, report) = LmBackend.solve(&problem, x0, &solve_opts);

        Ok(BackendSolution {
            params: problem.solution_map(&x_opt),
            initial_cost,
            final_cost: 0.5 * problem.cost(&x_opt),
            iterations: report.iterations,
            evaluations: report.evaluations,
            converged: report.converged,
        })
    }
}
