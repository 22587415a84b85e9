//! Observation likelihood models
//!
//! Each model scores the log marginal likelihood of a contiguous segment of
//! a series under a conjugate prior. The closed forms follow
//! Fearnhead, "Exact and efficient Bayesian inference for multiple
//! changepoint problems" (Stat. Comput. 16, 2006) for the Gaussian and
//! independent-features models, and Xuan & Murphy, "Modeling changing
//! dependency structure in multivariate time series" (ICML 2007) for the
//! full-covariance model.
//!
//! Segments are inclusive: `(t, s)` covers rows `t` through `s`.

use crate::engine::Engine;
use crate::error::CpdError;
use crate::numeric::ln_multigamma;
use nalgebra::DMatrix;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use special::Gamma;
use std::f64::consts::PI;
use std::str::FromStr;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Lower bound for the pooled prior variance of a segment.
///
/// Keeps constant and single-row segments finite.
const VARIANCE_FLOOR: f64 = f64::MIN_POSITIVE;

/// Observation model for the offline detector.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Likelihood {
    /// Normal-Gamma marginal per column. With several columns the
    /// Student-t log term is pooled over every entry of the segment and
    /// charged to each column.
    Gaussian,
    /// Independent features sharing one prior scale.
    Ifm,
    /// Normal-Inverse-Wishart marginal with a full covariance matrix.
    FullCov,
}

impl FromStr for Likelihood {
    type Err = CpdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauss" | "gaussian" => Ok(Self::Gaussian),
            "ifm" => Ok(Self::Ifm),
            "full_cov" | "fullcov" => Ok(Self::FullCov),
            other => Err(CpdError::UnknownModel {
                kind: "likelihood",
                name: other.to_string(),
            }),
        }
    }
}

impl Likelihood {
    /// Log-likelihood of rows `t..=s` of `data`, reference path.
    ///
    /// # Example
    /// ```rust
    /// use bayescpd::Likelihood;
    /// use ndarray::Array2;
    ///
    /// let data = Array2::from_shape_fn((10_000, 1), |(i, _)| i as f64);
    /// let ll = Likelihood::Gaussian.ln_likelihood(data.view(), 10, 1000);
    /// assert!((ll - -7011.825860906335).abs() < 1e-6);
    /// ```
    ///
    /// # Panics
    /// If `t > s` or `s` is not a row of `data`.
    #[must_use]
    pub fn ln_likelihood(&self, data: ArrayView2<f64>, t: usize, s: usize) -> f64 {
        self.ln_likelihood_with(Engine::Reference, data, t, s)
    }

    /// Log-likelihood of rows `t..=s` of `data` on the given engine.
    ///
    /// # Panics
    /// If `t > s` or `s` is not a row of `data`.
    #[must_use]
    pub fn ln_likelihood_with(
        &self,
        engine: Engine,
        data: ArrayView2<f64>,
        t: usize,
        s: usize,
    ) -> f64 {
        assert!(t <= s, "segment start {t} is past its end {s}");
        SegmentScan::new(*self, engine, data, t).extend_to(s)
    }

    /// Closed-form marginal from the segment statistics.
    ///
    /// The Gaussian model additionally needs the raw rows for its
    /// Student-t log term; the other two only use `stats`.
    pub(crate) fn ln_marginal(
        &self,
        stats: &SegmentStats,
        segment: ArrayView2<f64>,
    ) -> f64 {
        match self {
            Self::Gaussian => gaussian(stats, segment),
            Self::Ifm => ifm(stats),
            Self::FullCov => full_cov(stats),
        }
    }
}

/// Segments sharing one start row, evaluated for growing end rows.
///
/// The reference engine rebuilds the statistics from the rows on every call;
/// the accelerated engine keeps them running and only folds in the new rows.
pub(crate) struct SegmentScan<'a> {
    likelihood: Likelihood,
    engine: Engine,
    data: ArrayView2<'a, f64>,
    start: usize,
    stats: SegmentStats,
}

impl<'a> SegmentScan<'a> {
    pub(crate) fn new(
        likelihood: Likelihood,
        engine: Engine,
        data: ArrayView2<'a, f64>,
        start: usize,
    ) -> Self {
        Self {
            likelihood,
            engine,
            data,
            start,
            stats: SegmentStats::empty(data.ncols()),
        }
    }

    /// Log-likelihood of rows `start..=end`.
    ///
    /// With the accelerated engine `end` must not decrease between calls.
    pub(crate) fn extend_to(&mut self, end: usize) -> f64 {
        let segment = self.data.slice(s![self.start..=end, ..]);
        match self.engine {
            Engine::Reference => {
                let stats = SegmentStats::from_rows(segment);
                self.likelihood.ln_marginal(&stats, segment)
            }
            Engine::Accelerated => {
                debug_assert!(self.start + self.stats.len() <= end + 1);
                while self.start + self.stats.len() <= end {
                    let row = self.data.row(self.start + self.stats.len());
                    self.stats.push(row);
                }
                self.likelihood.ln_marginal(&self.stats, segment)
            }
        }
    }
}

/// Sufficient statistics of one segment: row count, column means and the
/// centered co-moment matrix `Σ (x - m)(x - m)ᵀ`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SegmentStats {
    n: usize,
    mean: Array1<f64>,
    comoment: Array2<f64>,
}

impl SegmentStats {
    pub(crate) fn empty(dim: usize) -> Self {
        Self {
            n: 0,
            mean: Array1::zeros(dim),
            comoment: Array2::zeros((dim, dim)),
        }
    }

    /// Two-pass statistics straight from the rows.
    pub(crate) fn from_rows(rows: ArrayView2<f64>) -> Self {
        let n = rows.nrows();
        let mean = rows.sum_axis(Axis(0)) / n as f64;
        let centered = &rows - &mean;
        let comoment = centered.t().dot(&centered);
        Self { n, mean, comoment }
    }

    /// Welford update with one more row.
    pub(crate) fn push(&mut self, row: ArrayView1<f64>) {
        self.n += 1;
        let delta = &row - &self.mean;
        self.mean.scaled_add(1.0 / self.n as f64, &delta);
        let delta_new = &row - &self.mean;
        let outer = delta
            .view()
            .insert_axis(Axis(1))
            .dot(&delta_new.view().insert_axis(Axis(0)));
        self.comoment += &outer;
    }

    pub(crate) fn len(&self) -> usize {
        self.n
    }

    /// Population variance over every entry of the segment.
    fn pooled_variance(&self) -> f64 {
        let n = self.n as f64;
        let d = self.mean.len() as f64;
        let grand = self.mean.sum() / d;
        let ss: f64 = self
            .mean
            .iter()
            .zip(self.comoment.diag())
            .map(|(m, c)| c + n * (m - grand).powi(2))
            .sum();
        (ss / (n * d)).max(VARIANCE_FLOOR)
    }

    /// Raw second moment `Σ x_i x_j` of columns `i` and `j`.
    fn raw_moment(&self, i: usize, j: usize) -> f64 {
        let c = 0.5 * (self.comoment[[i, j]] + self.comoment[[j, i]]);
        c + self.n as f64 * self.mean[i] * self.mean[j]
    }
}

fn gaussian(stats: &SegmentStats, segment: ArrayView2<f64>) -> f64 {
    let n = stats.n as f64;
    let nu_t = 1.0 + n;
    let alpha_t = 1.0 + n / 2.0;
    let ln_gamma_ratio = ((nu_t + 1.0) / 2.0).ln_gamma().0 - (nu_t / 2.0).ln_gamma().0;

    let columns: Vec<(f64, f64)> = (0..stats.mean.len())
        .map(|c| {
            let mean = stats.mean[c];
            let mu_t = n * mean / nu_t;
            let beta_t =
                1.0 + 0.5 * stats.comoment[[c, c]] + n / nu_t * mean * mean / 2.0;
            (mu_t, beta_t * (nu_t + 1.0) / (alpha_t * nu_t))
        })
        .collect();

    // One log term over every entry of the segment, shared by all columns.
    let log_term: f64 = segment
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .zip(&columns)
                .map(|(x, (mu_t, scale))| ((x - mu_t).powi(2) / (nu_t * scale)).ln_1p())
                .sum::<f64>()
        })
        .sum();

    columns
        .iter()
        .map(|(_, scale)| {
            let ln_a = ln_gamma_ratio - 0.5 * (PI * nu_t * scale).ln();
            n * ln_a - (nu_t + 1.0) / 2.0 * log_term
        })
        .sum()
}

fn ifm(stats: &SegmentStats) -> f64 {
    let n = stats.n as f64;
    let n0 = stats.mean.len() as f64;
    let v0 = stats.pooled_variance();
    let per_column = -(n / 2.0) * PI.ln() + (n0 / 2.0) * v0.ln() - (n0 / 2.0).ln_gamma().0
        + ((n0 + n) / 2.0).ln_gamma().0;

    (0..stats.mean.len())
        .map(|c| {
            let vn = v0 + stats.raw_moment(c, c);
            per_column - ((n0 + n) / 2.0) * vn.ln()
        })
        .sum()
}

fn full_cov(stats: &SegmentStats) -> f64 {
    let n = stats.n as f64;
    let dim = stats.mean.len();
    let d = dim as f64;
    let n0 = d;
    let v0 = stats.pooled_variance();
    let vn = DMatrix::from_fn(dim, dim, |i, j| {
        let prior = if i == j { v0 } else { 0.0 };
        prior + stats.raw_moment(i, j)
    });

    -(d * n / 2.0) * PI.ln() + (n0 / 2.0) * d * v0.ln() - ln_multigamma(n0 / 2.0, dim)
        + ln_multigamma((n0 + n) / 2.0, dim)
        - ((n0 + n) / 2.0) * ln_det(vn)
}

/// `ln |det m|` for a symmetric positive-definite matrix, with an LU
/// fallback when the Cholesky factorisation breaks down.
fn ln_det(m: DMatrix<f64>) -> f64 {
    match m.clone().cholesky() {
        Some(chol) => 2.0 * chol.l_dirty().diagonal().iter().map(|x| x.ln()).sum::<f64>(),
        None => m.determinant().abs().ln(),
    }
}
