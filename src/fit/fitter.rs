//! Logistic fitting for a single concentration group.
//!
//! Given the concatenated `(x, y)` samples of one group we:
//! - build an initial guess from the data
//! - run Levenberg–Marquardt on the four logistic parameters (no bounds)
//! - evaluate the fitted curve on a fixed uniform grid
//! - locate the inflection proxy: the grid point where the discrete second
//!   derivative is smallest
//!
//! A failed fit is returned as `FitError`; callers drop that group and carry on.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use crate::domain::{Concentration, FitQuality, FitResult, SigmoidParams};
use crate::fit::aggregate::ConcentrationGroup;
use crate::math::{LeastSquaresProblem, LmError, LmOptions, argmin, finite_range, gradient, linspace, median, minimize};
use crate::models::{sigmoid, sigmoid_curve, sigmoid_gradient};

/// Resolution of the fitted-curve grid. Inflection positions depend on it.
pub const CURVE_GRID_POINTS: usize = 1000;

/// One point per parameter; anything less is underdetermined.
pub const MIN_FIT_POINTS: usize = 4;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FitError {
    #[error("degenerate input: {0}")]
    Degenerate(String),
    #[error(transparent)]
    Optimizer(#[from] LmError),
    #[error("fitted curve is not finite")]
    NonFinite,
}

/// Fitting options.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Objective evaluation cap for the optimizer.
    pub max_evaluations: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_evaluations: LmOptions::default().max_evaluations,
        }
    }
}

/// Starting point for the optimizer.
///
/// `L = max(y)`, `x0 = median(x)`, `k = 1`, `b = min(y)`.
///
/// This assumes a rising curve whose observed range spans the true amplitude.
/// Falling curves, or data that plateaus at both ends far from `max(y)`/`min(y)`,
/// start far from the optimum and may converge poorly or not at all.
pub fn initial_guess(x: &[f64], y: &[f64]) -> Option<SigmoidParams> {
    let (y_min, y_max) = finite_range(y)?;
    let x_mid = median(x)?;
    Some(SigmoidParams {
        l: y_max,
        x0: x_mid,
        k: 1.0,
        b: y_min,
    })
}

struct SigmoidProblem<'a> {
    x: &'a [f64],
    y: &'a [f64],
}

impl LeastSquaresProblem for SigmoidProblem<'_> {
    fn residual_count(&self) -> usize {
        self.x.len()
    }

    fn residuals(&self, p: &DVector<f64>, out: &mut DVector<f64>) {
        let params = SigmoidParams::from_slice(p.as_slice());
        for (i, (&x, &y)) in self.x.iter().zip(self.y).enumerate() {
            out[i] = sigmoid(x, &params) - y;
        }
    }

    fn jacobian(&self, p: &DVector<f64>, out: &mut DMatrix<f64>) {
        let params = SigmoidParams::from_slice(p.as_slice());
        for (i, &x) in self.x.iter().enumerate() {
            let row = sigmoid_gradient(x, &params);
            for (j, v) in row.into_iter().enumerate() {
                out[(i, j)] = v;
            }
        }
    }
}

/// Fit the logistic to `(x, y)` and derive the curve grid and inflection point.
pub fn fit(
    concentration: Concentration,
    x: &[f64],
    y: &[f64],
    opts: &FitOptions,
) -> Result<FitResult, FitError> {
    if x.len() != y.len() {
        return Err(FitError::Degenerate(format!(
            "x has {} values but y has {}",
            x.len(),
            y.len()
        )));
    }

    // Non-finite pairs carry no information for least squares.
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .unzip();

    let n = xs.len();
    if n < MIN_FIT_POINTS {
        return Err(FitError::Degenerate(format!(
            "need at least {MIN_FIT_POINTS} finite points, got {n}"
        )));
    }
    let (x_min, x_max) = finite_range(&xs).ok_or(FitError::NonFinite)?;
    if x_max <= x_min {
        return Err(FitError::Degenerate("all samples share one time value".to_string()));
    }
    let (y_min, y_max) = finite_range(&ys).ok_or(FitError::NonFinite)?;
    if y_max <= y_min {
        return Err(FitError::Degenerate("signal has zero variance".to_string()));
    }

    let p0 = initial_guess(&xs, &ys).ok_or(FitError::NonFinite)?;
    let lm_opts = LmOptions {
        max_evaluations: opts.max_evaluations,
        ..LmOptions::default()
    };
    let problem = SigmoidProblem { x: &xs, y: &ys };
    let report = minimize(&problem, DVector::from_row_slice(&p0.to_array()), &lm_opts)?;

    let params = SigmoidParams::from_slice(report.params.as_slice());
    if !params.is_finite() {
        return Err(FitError::NonFinite);
    }

    let curve_x = linspace(x_min, x_max, CURVE_GRID_POINTS);
    let curve_y = sigmoid_curve(&curve_x, &params);
    if curve_y.iter().any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }
    let inflection_x = inflection_point(&curve_x, &curve_y).ok_or(FitError::NonFinite)?;

    Ok(FitResult {
        concentration,
        params,
        curve_x,
        curve_y,
        inflection_x,
        quality: FitQuality {
            sse: report.sse,
            rmse: (report.sse / n as f64).sqrt(),
            n,
            evaluations: report.evaluations,
        },
        files: 0,
    })
}

/// Fit one aggregated group.
pub fn fit_group(group: &ConcentrationGroup, opts: &FitOptions) -> Result<FitResult, FitError> {
    let (x, y) = group.concatenated();
    let mut result = fit(group.concentration, &x, &y, opts)?;
    result.files = group.batches.len();
    Ok(result)
}

/// Grid x-coordinate where the discrete second derivative is smallest.
///
/// For a rising logistic this sits just past `x0` (where curvature turns most
/// negative), not exactly at `x0`; it is a proxy, and it moves with the grid.
pub fn inflection_point(curve_x: &[f64], curve_y: &[f64]) -> Option<f64> {
    let d1 = gradient(curve_y, curve_x)?;
    let d2 = gradient(&d1, curve_x)?;
    argmin(&d2).map(|idx| curve_x[idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    fn conc(v: f64) -> Concentration {
        Concentration::new(v).unwrap()
    }

    #[test]
    fn initial_guess_uses_data_extremes_and_median() {
        let x = [0.0, 100.0, 200.0, 300.0, 400.0, 500.0];
        let y = [1.0, 1.0, 5.0, 9.0, 10.0, 10.0];
        let p = initial_guess(&x, &y).unwrap();
        assert_eq!(p.l, 10.0);
        assert_eq!(p.x0, 250.0);
        assert_eq!(p.k, 1.0);
        assert_eq!(p.b, 1.0);
    }

    #[test]
    fn small_rising_series_converges_with_inflection_in_range() {
        let x = [0.0, 100.0, 200.0, 300.0, 400.0, 500.0];
        let y = [1.0, 1.0, 5.0, 9.0, 10.0, 10.0];

        let fit = fit(conc(5.0), &x, &y, &FitOptions::default()).unwrap();
        assert_eq!(fit.concentration, conc(5.0));
        assert!(
            (200.0..=300.0).contains(&fit.inflection_x),
            "inflection at {}",
            fit.inflection_x
        );
        assert_eq!(fit.curve_x.len(), CURVE_GRID_POINTS);
        assert!(fit.curve_x.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(fit.curve_x[0], 0.0);
        assert_eq!(fit.curve_x[CURVE_GRID_POINTS - 1], 500.0);
    }

    #[test]
    fn noisy_logistic_recovers_parameters() {
        let truth = SigmoidParams {
            l: 10.0,
            x0: 300.0,
            k: 0.1,
            b: 1.0,
        };
        let mut rng = StdRng::seed_from_u64(7);
        let noise = Normal::new(0.0, 0.1).unwrap();

        let x: Vec<f64> = (0..600).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&t| sigmoid(t, &truth) + noise.sample(&mut rng))
            .collect();

        let fit = fit(conc(1.0), &x, &y, &FitOptions::default()).unwrap();
        assert!((fit.params.x0 - 300.0).abs() < 3.0, "x0 = {}", fit.params.x0);
        assert!((0.08..0.12).contains(&fit.params.k), "k = {}", fit.params.k);
        assert!((fit.params.l - 10.0).abs() < 0.5, "L = {}", fit.params.l);
        assert!(fit.inflection_x > 300.0 && fit.inflection_x < 330.0);
        assert!(fit.quality.rmse < 0.2);
    }

    #[test]
    fn zero_variance_signal_fails() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = [2.0; 5];
        let err = fit(conc(2.0), &x, &y, &FitOptions::default()).unwrap_err();
        assert!(matches!(err, FitError::Degenerate(_)));
    }

    #[test]
    fn too_few_points_fail() {
        let err = fit(conc(2.0), &[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0], &FitOptions::default()).unwrap_err();
        assert!(matches!(err, FitError::Degenerate(_)));
    }

    #[test]
    fn large_amplitude_logistic_converges_to_the_true_curve() {
        let truth = SigmoidParams {
            l: 3000.0,
            x0: 150.0,
            k: 0.05,
            b: 0.0,
        };
        let mut rng = StdRng::seed_from_u64(11);
        let noise = Normal::new(0.0, 30.0).unwrap();

        // Three pooled files, one sample per second each.
        let x: Vec<f64> = (0..3).flat_map(|_| (0..600).map(|i| i as f64)).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&t| sigmoid(t, &truth) + noise.sample(&mut rng))
            .collect();

        let fit = fit(conc(8.0), &x, &y, &FitOptions::default()).unwrap();
        assert!((fit.params.x0 - 150.0).abs() < 2.0, "x0 = {}", fit.params.x0);
        assert!((0.045..0.055).contains(&fit.params.k), "k = {}", fit.params.k);
        assert!((fit.params.l - 3000.0).abs() < 30.0, "L = {}", fit.params.l);
        assert!(fit.quality.rmse < 35.0, "rmse = {}", fit.quality.rmse);
        // Curvature minimum: x0 + ln(2 + √3) / k ≈ 176.3.
        assert!(
            (170.0..183.0).contains(&fit.inflection_x),
            "inflection at {}",
            fit.inflection_x
        );
    }

    #[test]
    fn inflection_stays_inside_data_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let noise = Normal::new(0.0, 0.1).unwrap();
        let falling = SigmoidParams {
            l: 8.0,
            x0: 250.0,
            k: -0.04,
            b: 1.0,
        };
        let fx: Vec<f64> = (0..120).map(|i| i as f64 * 5.0).collect();
        let fy: Vec<f64> = fx
            .iter()
            .map(|&t| sigmoid(t, &falling) + noise.sample(&mut rng))
            .collect();

        let cases = [
            (vec![0.0, 50.0, 120.0, 180.0, 240.0, 599.0], vec![0.2, 0.4, 2.0, 6.0, 7.5, 8.0]),
            (vec![10.0, 20.0, 30.0, 40.0, 50.0], vec![0.0, 0.1, 3.0, 3.9, 4.0]),
            (fx, fy),
        ];
        for (x, y) in cases {
            let fit = fit(conc(1.0), &x, &y, &FitOptions::default()).unwrap();
            let (lo, hi) = finite_range(&x).unwrap();
            assert!(
                fit.inflection_x >= lo && fit.inflection_x <= hi,
                "inflection {} outside [{lo}, {hi}]",
                fit.inflection_x
            );
        }
    }

    #[test]
    fn inflection_of_known_curve_sits_past_midpoint() {
        let p = SigmoidParams {
            l: 1.0,
            x0: 50.0,
            k: 0.5,
            b: 0.0,
        };
        let xs = linspace(0.0, 100.0, CURVE_GRID_POINTS);
        let ys = sigmoid_curve(&xs, &p);
        let x_star = inflection_point(&xs, &ys).unwrap();
        // Curvature minimum of a logistic: x0 + ln(2 + √3) / k ≈ x0 + 2.63.
        assert!((x_star - 52.63).abs() < 0.2, "x* = {x_star}");
    }
}
