//! Levenberg–Marquardt nonlinear least squares.
//!
//! We minimize
//!
//! ```text
//! F(p) = ½ Σ r_i(p)^2
//! ```
//!
//! with a damped Gauss–Newton step
//!
//! ```text
//! (JᵀJ + μ D) h = -Jᵀ r
//! ```
//!
//! where the damping `μ` acts as an implicit trust region: accepted steps shrink it
//! (gain-ratio update), rejected steps grow it. This is the classic scheme from
//! Madsen, Nielsen & Tingleff, "Methods for Non-Linear Least Squares Problems".
//!
//! `D` is Marquardt's scaling: the running maximum of `diag(JᵀJ)`, floored at a
//! tiny fraction of its largest entry. Parameters on very different scales (an
//! amplitude in the thousands next to a rate of 0.05) are then damped evenly.
//!
//! Implementation choices:
//! - The parameter dimension is tiny (4 for the logistic), so we form the normal
//!   equations explicitly and solve with a Cholesky factorization.
//! - Only objective evaluations count against the evaluation cap; the Jacobian is
//!   analytic and supplied by the problem.
//! - The step and cost criteria are only tested on accepted steps. A rejected
//!   step is small because `μ` is large, not because `p` is near a minimum.
//! - No parameter bounds.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// A least-squares problem: residuals and their Jacobian at a parameter vector.
pub trait LeastSquaresProblem {
    /// Number of residuals (rows of the Jacobian).
    fn residual_count(&self) -> usize;

    /// Write `r(p)` into `out` (length `residual_count`).
    fn residuals(&self, p: &DVector<f64>, out: &mut DVector<f64>);

    /// Write `∂r/∂p` into `out` (`residual_count × p.len()`).
    fn jacobian(&self, p: &DVector<f64>, out: &mut DMatrix<f64>);
}

/// Solver settings.
#[derive(Debug, Clone)]
pub struct LmOptions {
    /// Maximum number of objective evaluations.
    pub max_evaluations: usize,
    /// Stop when `‖Jᵀr‖∞ <= gtol`.
    pub gtol: f64,
    /// Stop when an accepted step has `‖h‖ <= xtol (‖p‖ + xtol)`.
    pub xtol: f64,
    /// Stop when a well-predicted accepted step reduces `F` by less than `ftol · F`.
    pub ftol: f64,
    /// Initial damping, relative to the scaling `D`.
    pub tau: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_evaluations: 10_000,
            gtol: 1e-8,
            xtol: 1e-8,
            ftol: 1e-8,
            tau: 1e-3,
        }
    }
}

/// Which criterion ended the iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    Gradient,
    Step,
    Cost,
}

#[derive(Debug, Clone)]
pub struct LmReport {
    pub params: DVector<f64>,
    /// `Σ r_i^2` at the solution.
    pub sse: f64,
    pub evaluations: usize,
    pub iterations: usize,
    pub convergence: Convergence,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LmError {
    #[error("optimal parameters not found: {evaluations} evaluations exhausted")]
    MaxEvaluations { evaluations: usize },
    #[error("normal equations stayed singular at damping {damping:e}")]
    Singular { damping: f64 },
    #[error("non-finite residuals at the starting point")]
    NonFinite,
}

/// Gain ratio an accepted step needs before the cost criterion may stop.
const COST_STOP_MIN_GAIN: f64 = 0.25;

/// Lower bound on each scaling entry, relative to the largest one.
const SCALING_FLOOR: f64 = 1e-12;

/// Fold `diag(a)` into the running scaling `d`.
fn update_scaling(d: &mut DVector<f64>, a: &DMatrix<f64>) {
    for (di, &aii) in d.iter_mut().zip(a.diagonal().iter()) {
        if aii > *di {
            *di = aii;
        }
    }
    let floor = SCALING_FLOOR * d.max();
    for di in d.iter_mut() {
        if floor <= 0.0 {
            *di = 1.0;
        } else if di.is_nan() || *di < floor {
            *di = floor;
        }
    }
}

/// Minimize `½‖r(p)‖²` starting from `p0`.
pub fn minimize<P: LeastSquaresProblem>(
    problem: &P,
    p0: DVector<f64>,
    opts: &LmOptions,
) -> Result<LmReport, LmError> {
    let m = problem.residual_count();
    let n = p0.len();

    let mut p = p0;
    let mut r = DVector::<f64>::zeros(m);
    let mut jac = DMatrix::<f64>::zeros(m, n);

    problem.residuals(&p, &mut r);
    let mut evaluations = 1usize;
    if r.iter().any(|v| !v.is_finite()) {
        return Err(LmError::NonFinite);
    }
    let mut cost = 0.5 * r.norm_squared();

    problem.jacobian(&p, &mut jac);
    let mut a = jac.tr_mul(&jac);
    let mut g = jac.tr_mul(&r);

    let mut scaling = DVector::<f64>::zeros(n);
    update_scaling(&mut scaling, &a);
    let mut mu = opts.tau;
    let mut nu = 2.0_f64;

    let mut r_trial = DVector::<f64>::zeros(m);
    let mut iterations = 0usize;

    let finish = |p: DVector<f64>, cost: f64, evaluations, iterations, convergence| LmReport {
        params: p,
        sse: 2.0 * cost,
        evaluations,
        iterations,
        convergence,
    };

    loop {
        if g.amax() <= opts.gtol {
            return Ok(finish(p, cost, evaluations, iterations, Convergence::Gradient));
        }
        if evaluations >= opts.max_evaluations {
            return Err(LmError::MaxEvaluations { evaluations });
        }
        if !mu.is_finite() {
            return Err(LmError::Singular { damping: mu });
        }
        iterations += 1;

        let mut damped = a.clone();
        for i in 0..n {
            damped[(i, i)] += mu * scaling[i];
        }
        let Some(chol) = damped.cholesky() else {
            mu *= nu;
            nu *= 2.0;
            continue;
        };
        let h = chol.solve(&(-&g));

        let p_trial = &p + &h;
        problem.residuals(&p_trial, &mut r_trial);
        evaluations += 1;
        let cost_trial = 0.5 * r_trial.norm_squared();

        // Predicted reduction of the local quadratic model: ½ hᵀ(μDh − g) > 0.
        let predicted = 0.5 * h.dot(&(h.component_mul(&scaling) * mu - &g));
        let rho = if cost_trial.is_finite() && predicted > 0.0 {
            (cost - cost_trial) / predicted
        } else {
            -1.0
        };

        if rho > 0.0 {
            let reduction = cost - cost_trial;
            let previous = cost;
            let small_step = h.norm() <= opts.xtol * (p.norm() + opts.xtol);

            p = p_trial;
            std::mem::swap(&mut r, &mut r_trial);
            cost = cost_trial;

            problem.jacobian(&p, &mut jac);
            a = jac.tr_mul(&jac);
            g = jac.tr_mul(&r);
            update_scaling(&mut scaling, &a);

            mu *= (1.0_f64 / 3.0).max(1.0 - (2.0 * rho - 1.0).powi(3));
            nu = 2.0;

            if small_step {
                return Ok(finish(p, cost, evaluations, iterations, Convergence::Step));
            }
            if rho > COST_STOP_MIN_GAIN && reduction <= opts.ftol * previous {
                return Ok(finish(p, cost, evaluations, iterations, Convergence::Cost));
            }
        } else {
            mu *= nu;
            nu *= 2.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// y = a · exp(b · t)
    struct ExpDecay {
        t: Vec<f64>,
        y: Vec<f64>,
    }

    impl LeastSquaresProblem for ExpDecay {
        fn residual_count(&self) -> usize {
            self.t.len()
        }

        fn residuals(&self, p: &DVector<f64>, out: &mut DVector<f64>) {
            for (i, (&t, &y)) in self.t.iter().zip(&self.y).enumerate() {
                out[i] = p[0] * (p[1] * t).exp() - y;
            }
        }

        fn jacobian(&self, p: &DVector<f64>, out: &mut DMatrix<f64>) {
            for (i, &t) in self.t.iter().enumerate() {
                let e = (p[1] * t).exp();
                out[(i, 0)] = e;
                out[(i, 1)] = p[0] * t * e;
            }
        }
    }

    #[test]
    fn recovers_exponential_parameters() {
        let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let y: Vec<f64> = t.iter().map(|&t| 3.0 * (-0.7 * t).exp()).collect();
        let problem = ExpDecay { t, y };

        let report = minimize(&problem, DVector::from_vec(vec![1.0, -0.1]), &LmOptions::default()).unwrap();
        assert_relative_eq!(report.params[0], 3.0, epsilon = 1e-6);
        assert_relative_eq!(report.params[1], -0.7, epsilon = 1e-6);
        assert!(report.sse < 1e-12);
    }

    #[test]
    fn evaluation_cap_is_reported() {
        let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let y: Vec<f64> = t.iter().map(|&t| 3.0 * (-0.7 * t).exp()).collect();
        let problem = ExpDecay { t, y };
        let opts = LmOptions {
            max_evaluations: 2,
            ..LmOptions::default()
        };

        let err = minimize(&problem, DVector::from_vec(vec![1.0, -0.1]), &opts).unwrap_err();
        assert_eq!(err, LmError::MaxEvaluations { evaluations: 2 });
    }

    #[test]
    fn non_finite_start_is_rejected() {
        let problem = ExpDecay {
            t: vec![0.0, 1.0],
            y: vec![f64::NAN, 1.0],
        };
        let err = minimize(&problem, DVector::from_vec(vec![1.0, 0.0]), &LmOptions::default()).unwrap_err();
        assert_eq!(err, LmError::NonFinite);
    }
}
