//! Dense Levenberg–Marquardt for small nonlinear least-squares problems.
//!
//! Solves the damped normal equations `(J^T J + lambda * D) delta = -J^T r`
//! with Marquardt's scaling `D = diag(J^T J)`, so parameters with very
//! different magnitudes (focal lengths in pixels, distortion coefficients)
//! are damped evenly.

use log::{debug, trace};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Nonlinear least-squares problem with dense residuals and Jacobian.
pub trait NllsProblem {
    /// Number of parameters in the optimization vector.
    fn num_params(&self) -> usize;
    /// Number of residual rows.
    fn num_residuals(&self) -> usize;
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Maximum number of Jacobian evaluations.
    pub max_iters: usize,
    /// Relative tolerance on the cost reduction of an accepted step.
    pub ftol: f64,
    /// Tolerance on the largest gradient component.
    pub gtol: f64,
    /// Relative tolerance on the parameter update.
    pub xtol: f64,
    /// Initial damping.
    pub lambda_init: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 100,
            ftol: 1e-12,
            gtol: 1e-12,
            xtol: 1e-12,
            lambda_init: 1e-3,
        }
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    CostConverged,
    GradientConverged,
    StepConverged,
    /// Damping grew past its limit without finding a better point; the
    /// current estimate is a local minimum to working precision.
    Stalled,
    MaxIterations,
    NonFinite,
}

impl Termination {
    pub fn converged(self) -> bool {
        !matches!(self, Termination::MaxIterations | Termination::NonFinite)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub iterations: usize,
    /// Sum of squared residuals at the start.
    pub initial_cost: f64,
    /// Sum of squared residuals at the returned parameters.
    pub final_cost: f64,
    pub termination: Termination,
}

impl SolveReport {
    pub fn converged(&self) -> bool {
        self.termination.converged()
    }
}

/// Pluggable optimizer backend.
pub trait NllsSolver {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<f64>,
        opts: &SolveOptions,
    ) -> (DVector<f64>, SolveReport);
}

#[derive(Debug, Clone, Copy)]
pub struct LevenbergMarquardt {
    pub lambda_factor: f64,
    pub lambda_max: f64,
    pub lambda_min: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            lambda_factor: 10.0,
            lambda_max: 1e16,
            lambda_min: 1e-15,
        }
    }
}

impl LevenbergMarquardt {
    pub fn new() -> Self {
        Self::default()
    }

    fn damped_step(
        jtj: &DMatrix<f64>,
        jtr: &DVector<f64>,
        lambda: f64,
    ) -> Option<DVector<f64>> {
        let mut a = jtj.clone();
        for k in 0..a.nrows() {
            a[(k, k)] += lambda * jtj[(k, k)].max(1e-12);
        }
        let chol = a.cholesky()?;
        Some(-chol.solve(jtr))
    }
}

impl NllsSolver for LevenbergMarquardt {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<f64>,
        opts: &SolveOptions,
    ) -> (DVector<f64>, SolveReport) {
        let mut x = x0;
        let mut r = problem.residuals(&x);
        let mut cost = r.norm_squared();
        let initial_cost = cost;

        let report = |iterations, final_cost, termination| SolveReport {
            iterations,
            initial_cost,
            final_cost,
            termination,
        };

        if !cost.is_finite() {
            return (x, report(0, cost, Termination::NonFinite));
        }

        let mut lambda = opts.lambda_init;
        for iter in 0..opts.max_iters {
            if cost <= f64::MIN_POSITIVE {
                return (x, report(iter, cost, Termination::CostConverged));
            }

            let jac = problem.jacobian(&x);
            let jtj = jac.transpose() * &jac;
            let jtr = jac.transpose() * &r;
            if !jtr.iter().all(|v| v.is_finite()) {
                return (x, report(iter, cost, Termination::NonFinite));
            }
            if jtr.amax() <= opts.gtol {
                return (x, report(iter, cost, Termination::GradientConverged));
            }

            // Raise the damping until a step lowers the cost.
            loop {
                let Some(delta) = Self::damped_step(&jtj, &jtr, lambda) else {
                    lambda *= self.lambda_factor;
                    if lambda > self.lambda_max {
                        return (x, report(iter, cost, Termination::Stalled));
                    }
                    continue;
                };

                if delta.norm() <= opts.xtol * (x.norm() + opts.xtol) {
                    return (x, report(iter + 1, cost, Termination::StepConverged));
                }

                let x_new = &x + &delta;
                let r_new = problem.residuals(&x_new);
                let cost_new = r_new.norm_squared();

                if cost_new.is_finite() && cost_new < cost {
                    let reduction = (cost - cost_new) / cost;
                    trace!(
                        "lm iter {}: cost {:.6e} -> {:.6e}, lambda {:.1e}",
                        iter,
                        cost,
                        cost_new,
                        lambda
                    );
                    x = x_new;
                    r = r_new;
                    cost = cost_new;
                    lambda = (lambda / self.lambda_factor).max(self.lambda_min);
                    if reduction <= opts.ftol {
                        return (x, report(iter + 1, cost, Termination::CostConverged));
                    }
                    break;
                }

                lambda *= self.lambda_factor;
                if lambda > self.lambda_max {
                    return (x, report(iter + 1, cost, Termination::Stalled));
                }
            }
        }

        debug!(
            "lm hit the iteration cap ({}) at cost {:.6e}",
            opts.max_iters, cost
        );
        (x, report(opts.max_iters, cost, Termination::MaxIterations))
    }
}
