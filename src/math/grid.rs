//! Grid helpers: uniform grids, numerical gradients, argmin and median.
//!
//! `gradient` follows the NumPy convention for an explicit coordinate array:
//!
//! - interior points use the second-order accurate formula for non-uniform
//!   spacing (reduces to central differences on a uniform grid)
//! - the two edge points use first-order one-sided differences
//!
//! Inflection detection differentiates the fitted curve twice with this, so
//! results stay comparable with reference numbers produced the same way.

use std::cmp::Ordering;

/// `n` evenly spaced samples over `[start, end]` (both endpoints included).
///
/// `n == 1` yields `[start]`; `n == 0` yields an empty vector.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n as f64 - 1.0);
            let mut out: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            out[n - 1] = end;
            out
        }
    }
}

/// Numerical derivative of `f` with respect to the coordinates `x`.
///
/// Returns `None` when the inputs differ in length, have fewer than two points,
/// or contain repeated coordinates (zero spacing).
pub fn gradient(f: &[f64], x: &[f64]) -> Option<Vec<f64>> {
    let n = f.len();
    if n < 2 || x.len() != n {
        return None;
    }
    if x.windows(2).any(|w| w[1] - w[0] == 0.0) {
        return None;
    }

    let mut out = vec![0.0; n];
    out[0] = (f[1] - f[0]) / (x[1] - x[0]);
    out[n - 1] = (f[n - 1] - f[n - 2]) / (x[n - 1] - x[n - 2]);

    for i in 1..n - 1 {
        let hs = x[i] - x[i - 1];
        let hd = x[i + 1] - x[i];
        let a = -hd / (hs * (hd + hs));
        let b = (hd - hs) / (hd * hs);
        let c = hs / (hd * (hd + hs));
        out[i] = a * f[i - 1] + b * f[i] + c * f[i + 1];
    }

    Some(out)
}

/// Index of the first minimum, skipping NaN. `None` if nothing comparable.
pub fn argmin(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v >= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Median of the finite values (mean of the two middle values for even counts).
pub fn median(values: &[f64]) -> Option<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        Some(v[mid])
    } else {
        Some((v[mid - 1] + v[mid]) / 2.0)
    }
}

/// `(min, max)` over finite values.
pub fn finite_range(values: &[f64]) -> Option<(f64, f64)> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &v in values.iter().filter(|v| v.is_finite()) {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if lo.is_finite() && hi.is_finite() {
        Some((lo, hi))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linspace_includes_endpoints() {
        let v = linspace(0.0, 500.0, 1000);
        assert_eq!(v.len(), 1000);
        assert_eq!(v[0], 0.0);
        assert_eq!(v[999], 500.0);
        assert!(v.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(linspace(3.0, 4.0, 1), vec![3.0]);
        assert!(linspace(3.0, 4.0, 0).is_empty());
    }

    #[test]
    fn gradient_uniform_matches_central_differences() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let f = [1.0, 2.0, 4.0, 7.0, 11.0];
        let g = gradient(&f, &x).unwrap();
        assert_eq!(g, vec![1.0, 1.5, 2.5, 3.5, 4.0]);
    }

    #[test]
    fn gradient_exact_for_quadratic_on_non_uniform_grid() {
        // The interior formula is exact for quadratics regardless of spacing.
        let x = [0.0, 0.5, 2.0, 2.2, 5.0];
        let f: Vec<f64> = x.iter().map(|v| v * v).collect();
        let g = gradient(&f, &x).unwrap();
        for i in 1..4 {
            assert_relative_eq!(g[i], 2.0 * x[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn gradient_rejects_degenerate_input() {
        assert!(gradient(&[1.0], &[0.0]).is_none());
        assert!(gradient(&[1.0, 2.0], &[0.0, 0.0]).is_none());
        assert!(gradient(&[1.0, 2.0], &[0.0]).is_none());
    }

    #[test]
    fn argmin_returns_first_minimum() {
        assert_eq!(argmin(&[3.0, 1.0, 2.0, 1.0]), Some(1));
        assert_eq!(argmin(&[f64::NAN, 2.0, 0.5]), Some(2));
        assert_eq!(argmin(&[]), None);
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[0.0, 100.0, 200.0, 300.0, 400.0, 500.0]), Some(250.0));
        assert_eq!(median(&[5.0, 1.0, 3.0]), Some(3.0));
        assert_eq!(median(&[]), None);
    }
}
