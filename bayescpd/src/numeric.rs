//! Numerical utilities
//!
//! Log-domain accumulation used by both detectors, a few special-function
//! combinations needed by the conjugate marginals, and the polynomial
//! helpers used to turn ODE coefficients of a sum-of-exponentials model
//! into decay rates.

use nalgebra::{Complex, DMatrix};
use ndarray::Array1;
use special::Gamma;
use std::f64::consts::PI;

/// `ln(exp(a) + exp(b))` without leaving the log domain.
#[must_use]
pub fn logaddexp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// `ln(Σ exp(x_i))` using the max-shift trick.
///
/// An empty input or one made only of `-inf` yields `-inf`; a NaN anywhere
/// yields NaN.
///
/// # Example
/// ```rust
/// use bayescpd::numeric::logsumexp;
///
/// let x = logsumexp([0.0_f64.ln(), 1.0_f64.ln(), 2.0_f64.ln()]);
/// assert!((x - 3.0_f64.ln()).abs() < 1e-12);
/// ```
pub fn logsumexp<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let mut max = f64::NEG_INFINITY;
    for v in iter.clone() {
        if v.is_nan() {
            return f64::NAN;
        }
        if v > max {
            max = v;
        }
    }
    if max == f64::NEG_INFINITY || max == f64::INFINITY {
        return max;
    }
    max + iter.map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Natural logarithm of the binomial coefficient `C(n, k)`.
///
/// Coefficients that vanish (`k < 0`, `n < 0` or `k > n`) give `-inf`.
#[must_use]
pub fn ln_binomial(n: i64, k: i64) -> f64 {
    if n < 0 || k < 0 || k > n {
        return f64::NEG_INFINITY;
    }
    let (n, k) = (n as f64, k as f64);
    (n + 1.0).ln_gamma().0 - (k + 1.0).ln_gamma().0 - (n - k + 1.0).ln_gamma().0
}

/// Multivariate log-gamma function `ln Γ_d(a)`.
#[must_use]
pub fn ln_multigamma(a: f64, d: usize) -> f64 {
    let df = d as f64;
    let c = df * (df - 1.0) / 4.0 * PI.ln();
    (1..=d).fold(c, |acc, j| acc + (a + (1.0 - j as f64) / 2.0).ln_gamma().0)
}

/// Shifted Legendre polynomials `P̃_0(x) .. P̃_{order-1}(x)` on `[0, 1]`.
#[must_use]
pub fn legendre(order: usize, x: f64) -> Array1<f64> {
    let y = 2.0 * x - 1.0;
    let mut out = Array1::zeros(order);
    if order > 0 {
        out[0] = 1.0;
    }
    if order > 1 {
        out[1] = y;
    }
    for k in 1..order.saturating_sub(1) {
        let kf = k as f64;
        out[k + 1] = ((2.0 * kf + 1.0) * y * out[k] - kf * out[k - 1]) / (kf + 1.0);
    }
    out
}

/// Complex roots of `c_0 + c_1 x + ... + c_m x^m`.
///
/// Trailing zero coefficients are dropped before the companion matrix is
/// built, so the result has as many roots as the effective degree. Roots are
/// ordered by real part.
#[must_use]
pub fn poly_roots(coeffs: &[f64]) -> Vec<Complex<f64>> {
    let Some(lead) = coeffs.iter().rposition(|c| *c != 0.0) else {
        return Vec::new();
    };
    if lead == 0 {
        return Vec::new();
    }
    let companion = DMatrix::from_fn(lead, lead, |i, j| {
        if j == lead - 1 {
            -coeffs[i] / coeffs[lead]
        } else if i == j + 1 {
            1.0
        } else {
            0.0
        }
    });
    let mut roots: Vec<Complex<f64>> =
        companion.complex_eigenvalues().iter().copied().collect();
    roots.sort_by(|a, b| a.re.total_cmp(&b.re));
    roots
}
