//! Offline Bayesian Change Point Detection
//!
//! This code is derived from
//! "Exact and efficient Bayesian inference for multiple changepoint problems";
//! Paul Fearnhead; Statistics and Computing 16, 203–213 (2006).
//!
//! The detector runs a backward product-partition recursion over all segment
//! boundaries of a complete series, followed by a forward pass that turns the
//! backward evidences into per-index changepoint probabilities. Everything is
//! kept in the log domain.

use crate::engine::Engine;
use crate::error::{CpdError, Result};
use crate::likelihood::{Likelihood, SegmentScan};
use crate::numeric::{logaddexp, logsumexp};
use crate::prior::Prior;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Pruning threshold that leaves results unchanged to floating-point noise.
pub const DEFAULT_TRUNCATE: f64 = -20.0;

const NEG_INF: f64 = f64::NEG_INFINITY;

/// Offline changepoint detector configuration.
///
/// The detector holds no per-series state; one instance can segment any
/// number of series, also from several threads.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct BayesOffline {
    prior: Prior,
    likelihood: Likelihood,
    engine: Engine,
    dim: Option<usize>,
}

/// Result of an offline segmentation.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct OfflineOutput {
    /// Log evidence of the whole series, `q[0]`.
    pub ln_evidence: f64,
    /// `prob[t]`: probability that a segment ends at `t` and a new one
    /// starts at `t + 1`. Length `n - 1`.
    pub prob: Array1<f64>,
    /// `q[t]`: log probability of rows `t..n` given a segment starts at `t`;
    /// `q[n] = 0`.
    pub q: Option<Array1<f64>>,
    /// `p[[t, s]]`: log-likelihood of rows `t..=s`, `-inf` where it was not
    /// evaluated.
    pub p: Option<Array2<f64>>,
    /// `pcp[[j, t]]`: log probability that the `(j + 1)`-th changepoint is
    /// at `t`.
    pub pcp: Option<Array2<f64>>,
}

impl OfflineOutput {
    /// First indices of new segments whose changepoint probability reaches
    /// `threshold`.
    #[must_use]
    pub fn changepoints(&self, threshold: f64) -> Vec<usize> {
        self.prob
            .iter()
            .enumerate()
            .filter(|(_, &p)| p >= threshold)
            .map(|(t, _)| t + 1)
            .collect()
    }
}

impl BayesOffline {
    /// Create a new offline detector.
    ///
    /// # Example
    /// ```rust
    /// use bayescpd::{BayesOffline, Likelihood, Prior, DEFAULT_TRUNCATE};
    ///
    /// let data: Vec<f64> = (0..60).map(|i| if i < 30 { 0.0 } else { 50.0 }).collect();
    /// let cpd = BayesOffline::new(Prior::Const, Likelihood::Gaussian);
    /// let out = cpd.find_changepoints_1d(&data, DEFAULT_TRUNCATE, false).unwrap();
    /// assert!(out.changepoints(0.5).contains(&30));
    /// ```
    #[must_use]
    pub fn new(prior: Prior, likelihood: Likelihood) -> Self {
        debug!(?prior, ?likelihood, "offline detector configured");
        Self {
            prior,
            likelihood,
            engine: Engine::default(),
            dim: None,
        }
    }

    /// Build a detector from model names, e.g. `("geometric", &[0.1], "gauss")`.
    ///
    /// # Errors
    /// Unknown names or invalid prior parameters.
    pub fn from_names(prior: &str, prior_params: &[f64], likelihood: &str) -> Result<Self> {
        let prior = Prior::from_name(prior, prior_params)?;
        let likelihood = likelihood.parse()?;
        Ok(Self::new(prior, likelihood))
    }

    /// Select the execution engine.
    #[must_use]
    pub fn with_engine(self, engine: Engine) -> Self {
        Self { engine, ..self }
    }

    /// Require every series to have `dim` columns.
    ///
    /// # Errors
    /// `dim` must be positive.
    pub fn with_dim(self, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(CpdError::InvalidParameter(
                "series dimensionality must be positive".to_string(),
            ));
        }
        Ok(Self {
            dim: Some(dim),
            ..self
        })
    }

    /// Segment length prior.
    #[must_use]
    pub fn prior(&self) -> Prior {
        self.prior
    }

    /// Observation model.
    #[must_use]
    pub fn likelihood(&self) -> Likelihood {
        self.likelihood
    }

    /// Execution engine.
    #[must_use]
    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Univariate convenience wrapper around [`find_changepoints`](Self::find_changepoints).
    ///
    /// # Errors
    /// See [`find_changepoints`](Self::find_changepoints).
    pub fn find_changepoints_1d(
        &self,
        data: &[f64],
        truncate: f64,
        full_output: bool,
    ) -> Result<OfflineOutput> {
        let view = ArrayView1::from(data).insert_axis(Axis(1));
        self.find_changepoints(view, truncate, full_output)
    }

    /// Changepoint posterior of a series shaped `(observations, dims)`.
    ///
    /// Terms of the backward recursion falling more than `-truncate` log
    /// units below the running sum end the scan of that row; pass
    /// `f64::NEG_INFINITY` to evaluate every segment. The `q`, `p` and `pcp`
    /// tables are only returned when `full_output` is set; `pcp` costs
    /// cubic time.
    ///
    /// # Errors
    /// A non-finite sample, or a column count differing from the one set
    /// with [`with_dim`](Self::with_dim).
    pub fn find_changepoints(
        &self,
        data: ArrayView2<f64>,
        truncate: f64,
        full_output: bool,
    ) -> Result<OfflineOutput> {
        self.validate(data)?;
        let n = data.nrows();
        if n == 0 {
            return Ok(OfflineOutput {
                ln_evidence: 0.0,
                prob: Array1::zeros(0),
                q: full_output.then(|| Array1::zeros(1)),
                p: full_output.then(|| Array2::zeros((0, 0))),
                pcp: full_output.then(|| Array2::zeros((0, 0))),
            });
        }

        let g = Array1::from_shape_fn(n + 1, |len| {
            if len == 0 {
                NEG_INF
            } else {
                self.prior.ln_probability(len, n)
            }
        });
        let mut cum_g = Array1::from_elem(n + 1, NEG_INF);
        for len in 1..=n {
            cum_g[len] = logaddexp(cum_g[len - 1], g[len]);
        }

        let (q, p, truncated_rows) = self.backward(data, &g, &cum_g, truncate);
        let prob = forward(&p, &q, &g);
        debug!(
            n,
            dims = data.ncols(),
            ln_evidence = q[0],
            truncated_rows,
            "offline segmentation finished"
        );

        let pcp = full_output.then(|| self.pcp_matrix(&p, &q, &g));
        Ok(OfflineOutput {
            ln_evidence: q[0],
            prob,
            q: full_output.then_some(q),
            p: full_output.then_some(p),
            pcp,
        })
    }

    /// Segment several independent series, one dynamic program each.
    ///
    /// # Errors
    /// The first error of any series.
    pub fn find_changepoints_many(
        &self,
        series: &[Array2<f64>],
        truncate: f64,
    ) -> Result<Vec<OfflineOutput>> {
        match self.engine {
            Engine::Reference => series
                .iter()
                .map(|x| self.find_changepoints(x.view(), truncate, false))
                .collect(),
            Engine::Accelerated => series
                .par_iter()
                .map(|x| self.find_changepoints(x.view(), truncate, false))
                .collect(),
        }
    }

    fn validate(&self, data: ArrayView2<f64>) -> Result<()> {
        let got = data.ncols();
        match self.dim {
            Some(expected) if expected != got => {
                return Err(CpdError::DimensionMismatch { expected, got });
            }
            None if got == 0 && data.nrows() > 0 => {
                return Err(CpdError::DimensionMismatch { expected: 1, got });
            }
            _ => {}
        }
        match data
            .rows()
            .into_iter()
            .enumerate()
            .find_map(|(i, row)| row.iter().find(|v| !v.is_finite()).map(|v| (i, *v)))
        {
            Some((index, value)) => Err(CpdError::NonFinite { index, value }),
            None => Ok(()),
        }
    }

    /// Backward recursion for `q` and the segment log-likelihoods `p`.
    fn backward(
        &self,
        data: ArrayView2<f64>,
        g: &Array1<f64>,
        cum_g: &Array1<f64>,
        truncate: f64,
    ) -> (Array1<f64>, Array2<f64>, usize) {
        let n = data.nrows();
        let mut q = Array1::zeros(n + 1);
        let mut p = Array2::from_elem((n, n), NEG_INF);
        let mut truncated_rows = 0;

        // Largest prior weight of any segment at least `len` rows long.
        let mut g_tail_max = Array1::from_elem(n + 2, NEG_INF);
        for len in (0..=n).rev() {
            g_tail_max[len] = g[len].max(g_tail_max[len + 1]);
        }

        for t in (0..n).rev() {
            let mut scan = SegmentScan::new(self.likelihood, self.engine, data, t);
            let mut acc = NEG_INF;
            for s in t..n - 1 {
                let ll = scan.extend_to(s);
                p[[t, s]] = ll;
                let len = s + 1 - t;
                let term = ll + g[len] + q[s + 1];
                acc = logaddexp(acc, term);
                // Fearnhead (2006), eq. (3), allowing for a prior that still
                // grows with segment length.
                let headroom = (g_tail_max[len + 1] - g[len]).max(0.0);
                if term + headroom - acc < truncate {
                    truncated_rows += 1;
                    break;
                }
            }
            let tail = scan.extend_to(n - 1);
            p[[t, n - 1]] = tail;
            q[t] = logaddexp(acc, tail + ln_survival(cum_g[n - 1 - t]));
        }
        (q, p, truncated_rows)
    }

    /// Log probability of the `(j + 1)`-th changepoint falling at `t`.
    fn pcp_matrix(&self, p: &Array2<f64>, q: &Array1<f64>, g: &Array1<f64>) -> Array2<f64> {
        let m = q.len().saturating_sub(2);
        let mut pcp = Array2::from_elem((m, m), NEG_INF);
        if m == 0 {
            return pcp;
        }
        let nan_cells = AtomicUsize::new(0);
        let finite_or_neg_inf = |v: f64| {
            if v.is_nan() {
                nan_cells.fetch_add(1, Ordering::Relaxed);
                NEG_INF
            } else {
                v
            }
        };

        for t in 0..m {
            pcp[[0, t]] = finite_or_neg_inf(p[[0, t]] + g[t + 1] + q[t + 1] - q[0]);
        }
        for j in 1..m {
            let (done, mut rest) = pcp.view_mut().split_at(Axis(0), j);
            let prev = done.row(j - 1);
            let cell = |t: usize| {
                if t < j {
                    return NEG_INF;
                }
                finite_or_neg_inf(logsumexp(
                    (j..=t).map(|i| prev[i - 1] + p[[i, t]] + g[t - i + 1] + q[t + 1] - q[i]),
                ))
            };
            let row = Zip::indexed(rest.row_mut(0));
            match self.engine {
                Engine::Reference => row.for_each(|t, v| *v = cell(t)),
                Engine::Accelerated => row.par_for_each(|t, v| *v = cell(t)),
            }
        }

        let nan_cells = nan_cells.into_inner();
        if nan_cells > 0 {
            warn!(nan_cells, "NaN changepoint log-probabilities mapped to -inf");
        }
        pcp
    }
}

/// `ln(1 - exp(cum))` for a cumulative log probability `cum`.
fn ln_survival(cum: f64) -> f64 {
    if cum < -1e-15 {
        (-cum.exp()).ln_1p()
    } else if cum < 0.0 {
        // 1 - exp(G) ~ -G once G is numerically zero
        (-cum).ln()
    } else {
        NEG_INF
    }
}

/// Forward pass: probability of a segment boundary after every index.
fn forward(p: &Array2<f64>, q: &Array1<f64>, g: &Array1<f64>) -> Array1<f64> {
    let n = p.nrows();
    let mut f = Array1::from_elem(n + 1, NEG_INF);
    f[0] = 0.0;
    for s in 0..n.saturating_sub(1) {
        let next = logsumexp((0..=s).map(|i| f[i] + p[[i, s]] + g[s - i + 1]));
        f[s + 1] = next;
    }
    Array1::from_shape_fn(n.saturating_sub(1), |t| {
        let v = (f[t + 1] + q[t + 1] - q[0]).exp();
        if v.is_nan() {
            0.0
        } else {
            v.clamp(0.0, 1.0)
        }
    })
}
