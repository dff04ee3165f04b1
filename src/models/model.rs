//! Model evaluation for the four-parameter logistic.
//!
//! ```text
//! f(x) = L / (1 + exp(-k (x - x0))) + b
//! ```
//!
//! The fitter relies on two primitive operations:
//! - predict `f(x)` for given parameters (objective, plots)
//! - the gradient of `f(x)` with respect to the parameters (Jacobian rows)
//!
//! Both go through `safe_exp`, so the objective, the Jacobian and every post-fit
//! evaluation see the same clamped exponential.

use crate::domain::SigmoidParams;

/// Exponent bound applied before `exp`.
///
/// `exp(500)` is ~1.4e217, comfortably inside `f64` range, while `exp(710)`
/// already overflows. Transiently large `k` values during optimization would
/// otherwise produce `inf` and poison the residuals.
pub const EXP_CLAMP: f64 = 500.0;

/// `exp(z)` with `z` clamped to `[-EXP_CLAMP, EXP_CLAMP]`.
pub fn safe_exp(z: f64) -> f64 {
    z.clamp(-EXP_CLAMP, EXP_CLAMP).exp()
}

/// Evaluate the logistic at a single `x`.
pub fn sigmoid(x: f64, p: &SigmoidParams) -> f64 {
    p.l / (1.0 + safe_exp(-p.k * (x - p.x0))) + p.b
}

/// Evaluate the logistic elementwise over `xs`.
pub fn sigmoid_curve(xs: &[f64], p: &SigmoidParams) -> Vec<f64> {
    xs.iter().map(|&x| sigmoid(x, p)).collect()
}

/// Partial derivatives `[∂f/∂L, ∂f/∂x0, ∂f/∂k, ∂f/∂b]` at `x`.
///
/// With `s = 1 / (1 + exp(-k (x - x0)))`:
///
/// - `∂f/∂L  = s`
/// - `∂f/∂x0 = -L k s (1 - s)`
/// - `∂f/∂k  = L (x - x0) s (1 - s)`
/// - `∂f/∂b  = 1`
pub fn sigmoid_gradient(x: f64, p: &SigmoidParams) -> [f64; 4] {
    let s = 1.0 / (1.0 + safe_exp(-p.k * (x - p.x0)));
    let ds = s * (1.0 - s);
    [s, -p.l * p.k * ds, p.l * (x - p.x0) * ds, 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn params(l: f64, x0: f64, k: f64, b: f64) -> SigmoidParams {
        SigmoidParams { l, x0, k, b }
    }

    #[test]
    fn safe_exp_never_overflows() {
        for &z in &[-1e6, -1e3, -500.0, 0.0, 500.0, 1e3, 1e6] {
            let v = safe_exp(z);
            assert!(v.is_finite(), "safe_exp({z}) = {v}");
        }
        assert_relative_eq!(safe_exp(1e6), 500.0_f64.exp());
        assert_relative_eq!(safe_exp(1.5), 1.5_f64.exp());
    }

    #[test]
    fn sigmoid_finite_for_extreme_exponent() {
        // |k (x - x0)| = 1e6 in both directions.
        let p = params(3.0, 0.0, 1e3, 1.0);
        let lo = sigmoid(-1e3, &p);
        let hi = sigmoid(1e3, &p);
        assert!(lo.is_finite() && hi.is_finite());
        assert_relative_eq!(lo, 1.0, epsilon = 1e-12);
        assert_relative_eq!(hi, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn sigmoid_midpoint_is_half_amplitude_plus_baseline() {
        for &(l, x0, k, b) in &[(10.0, 250.0, 0.05, 1.0), (-4.0, 3.0, -2.0, 0.5)] {
            let p = params(l, x0, k, b);
            assert_relative_eq!(sigmoid(x0, &p), l / 2.0 + b, epsilon = 1e-12);
        }
    }

    #[test]
    fn sigmoid_monotone_in_sign_of_k() {
        let xs: Vec<f64> = (0..200).map(|i| i as f64 * 3.0).collect();

        let rising = sigmoid_curve(&xs, &params(5.0, 300.0, 0.02, 0.0));
        assert!(rising.windows(2).all(|w| w[1] >= w[0]));

        let falling = sigmoid_curve(&xs, &params(5.0, 300.0, -0.02, 0.0));
        assert!(falling.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let p = params(8.0, 120.0, 0.04, 2.0);
        let x = 140.0;
        let g = sigmoid_gradient(x, &p);

        let h = 1e-6;
        let base = p.to_array();
        for j in 0..4 {
            let mut up = base;
            let mut dn = base;
            up[j] += h;
            dn[j] -= h;
            let fd = (sigmoid(x, &SigmoidParams::from_slice(&up))
                - sigmoid(x, &SigmoidParams::from_slice(&dn)))
                / (2.0 * h);
            assert_relative_eq!(g[j], fd, epsilon = 1e-5, max_relative = 1e-5);
        }
    }
}
