//! Online Bayesian Change Point Detection
//!
//! This code is derived from
//! "Bayesian Online Changepoint Detection"; Ryan Adams, David `MacKay`; arXiv:0710.3742
//! Which can be found [here](https://arxiv.org/pdf/0710.3742.pdf).

use crate::engine::Engine;
use crate::error::{ensure_finite, CpdError, Result};
use crate::hazard::Hazard;
use crate::numeric::logsumexp;
use crate::predictive::StudentT;
use crate::utils;
use ndarray::{s, Array1, Array2, ArrayView1, Zip};
use tracing::{debug, trace};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Online Bayesian Change Point Detection state container.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct BayesOnline {
    /// Probability of a changepoint given the current run length.
    hazard: Hazard,
    /// Probability of observing the next datum for every run length,
    /// i.e. $\pi^{(r)}_t = P(x_t | x^{(r)})$.
    predictive: StudentT,
    engine: Engine,
    /// Run-length distributions; entry `k` is the distribution after `k`
    /// updates.
    history: Vec<Vec<f64>>,
}

impl Default for BayesOnline {
    fn default() -> Self {
        Self::new(Hazard::default(), StudentT::default())
    }
}

impl BayesOnline {
    /// Create a new online analyzer.
    ///
    /// # Parameters
    /// * `hazard` - Prior probability of a changepoint at each run length.
    /// * `predictive` - Conjugate predictive for the observed data.
    ///
    /// # Example
    /// ```rust
    /// use bayescpd::{BayesOnline, Hazard, StudentT};
    ///
    /// let mut cpd = BayesOnline::new(
    ///     Hazard::constant(250.0).unwrap(),
    ///     StudentT::new(0.1, 0.01, 1.0, 0.0).unwrap(),
    /// );
    /// let r = cpd.update(3.2).unwrap();
    /// assert_eq!(r.len(), 2);
    /// ```
    #[must_use]
    pub fn new(hazard: Hazard, predictive: StudentT) -> Self {
        debug!(?hazard, prior = ?predictive.prior(), "online detector configured");
        let mut predictive = predictive;
        predictive.reset();
        Self {
            hazard,
            predictive,
            engine: Engine::default(),
            history: vec![vec![1.0]],
        }
    }

    /// Build a detector from model names, e.g.
    /// `("const", &[250.0], "student_t", &[0.1, 0.01, 1.0, 0.0])`.
    ///
    /// # Errors
    /// Unknown names, missing parameters and out-of-domain values.
    pub fn from_names(
        hazard: &str,
        hazard_params: &[f64],
        observation: &str,
        observation_params: &[f64],
    ) -> Result<Self> {
        let hazard = Hazard::from_name(hazard, hazard_params)?;
        let predictive = match observation {
            "student_t" | "t" => StudentT::from_params(observation_params)?,
            other => {
                return Err(CpdError::UnknownModel {
                    kind: "observation",
                    name: other.to_string(),
                })
            }
        };
        Ok(Self::new(hazard, predictive))
    }

    /// Select the execution engine.
    #[must_use]
    pub fn with_engine(self, engine: Engine) -> Self {
        Self { engine, ..self }
    }

    /// Hazard function.
    #[must_use]
    pub fn hazard(&self) -> Hazard {
        self.hazard
    }

    /// Current predictive state.
    #[must_use]
    pub fn predictive(&self) -> &StudentT {
        &self.predictive
    }

    /// Execution engine.
    #[must_use]
    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Number of processed samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len() - 1
    }

    /// True before the first update.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every processed sample.
    pub fn reset(&mut self) {
        self.history.truncate(1);
        self.predictive.reset();
    }

    /// Update the model with a new datum and return the distribution of run lengths.
    ///
    /// Growth and changepoint masses are combined in the log domain, so a
    /// finite outlier that no run length predicts well is still absorbed.
    ///
    /// # Errors
    /// A non-finite `x` is rejected and the detector is left as it was.
    pub fn update(&mut self, x: f64) -> Result<&[f64]> {
        let t = self.len();
        if !x.is_finite() {
            return Err(CpdError::NonFinite { index: t, value: x });
        }
        let old = self.current();
        let ln_pi = self.predictive.ln_pdf_with(self.engine, x);
        let run_lengths = Array1::from_shape_fn(old.len(), |r| r as f64);
        let h = self.hazard.evaluate(run_lengths.view());

        let mut ln_next = Array1::from_elem(old.len() + 1, f64::NEG_INFINITY);
        let mut ln_changepoint = Array1::from_elem(old.len(), f64::NEG_INFINITY);
        Zip::from(ln_next.slice_mut(s![1..]))
            .and(&mut ln_changepoint)
            .and(ArrayView1::from(old))
            .and(&ln_pi)
            .and(&h)
            .for_each(|grown, changepoint, &r, &lp, &hz| {
                let ln_mass = r.ln() + lp;
                *grown = ln_mass + (-hz).ln_1p();
                *changepoint = ln_mass + hz.ln();
            });
        ln_next[0] = logsumexp(ln_changepoint.iter().copied());

        let ln_total = logsumexp(ln_next.iter().copied());
        if !ln_total.is_finite() {
            return Err(CpdError::Numerical(format!(
                "run-length distribution at step {t} cannot be normalized (log sum {ln_total})"
            )));
        }
        let next = ln_next.mapv_into(|v| (v - ln_total).exp());

        self.predictive.update_theta(x)?;
        self.history.push(next.to_vec());
        trace!(t, run_lengths = next.len(), "online update");
        Ok(self.current())
    }

    /// Process a whole series from a fresh state and return
    /// [`changepoint_probabilities`](Self::changepoint_probabilities).
    ///
    /// # Errors
    /// The series is checked for non-finite values before the detector is
    /// reset; afterwards any update error is returned.
    pub fn find_changepoints(&mut self, series: &[f64], past: usize) -> Result<Array1<f64>> {
        ensure_finite(series)?;
        self.reset();
        for &x in series {
            self.update(x)?;
        }
        self.changepoint_probabilities(past)
    }

    /// Run-length distribution right after the `k`-th update (`[1.0]` for `k = 0`).
    ///
    /// # Errors
    /// `k` exceeds the number of processed samples.
    pub fn get_probabilities(&self, k: usize) -> Result<&[f64]> {
        self.history
            .get(k)
            .map(Vec::as_slice)
            .ok_or(CpdError::OutOfBounds {
                index: k,
                len: self.len(),
            })
    }

    /// Entry `i` is the probability, `past` samples after sample `i`, that
    /// the current run started at `i`.
    ///
    /// # Errors
    /// `past` exceeds the number of processed samples.
    pub fn changepoint_probabilities(&self, past: usize) -> Result<Array1<f64>> {
        let last = self.history.len() - 1;
        if past > last {
            return Err(CpdError::OutOfBounds {
                index: past,
                len: self.len(),
            });
        }
        Ok(self.history[past..last].iter().map(|h| h[past]).collect())
    }

    /// Lower-triangular matrix whose column `k` is the run-length
    /// distribution after `k` updates.
    #[must_use]
    pub fn probability_matrix(&self) -> Array2<f64> {
        let n = self.history.len();
        let mut matrix = Array2::zeros((n, n));
        for (k, h) in self.history.iter().enumerate() {
            for (r, &p) in h.iter().enumerate() {
                matrix[[r, k]] = p;
            }
        }
        matrix
    }

    /// Maximum a posteriori changepoints, as indices into the processed samples.
    #[must_use]
    pub fn map_changepoints(&self) -> Vec<usize> {
        utils::map_changepoints(&self.history[1..])
    }

    fn current(&self) -> &[f64] {
        // history always holds the initial distribution
        self.history.last().map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators;
    use crate::utils::window_over_threshold;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn detector() -> BayesOnline {
        BayesOnline::new(
            Hazard::default(),
            StudentT::new(0.1, 0.01, 1.0, 0.0).unwrap(),
        )
    }

    fn jump(size: usize) -> Vec<f64> {
        let mut rng = SmallRng::seed_from_u64(0xABCD);
        generators::discontinuous_jump(&mut rng, 0.0, 1.0, 10.0, 5.0, 500, size)
    }

    #[test]
    fn each_vec_is_a_probability_dist() {
        let data = jump(700);
        let mut cpd = detector();
        for (i, x) in data.iter().enumerate() {
            let r = cpd.update(*x).unwrap();
            assert_eq!(r.len(), i + 2);
            let sum: f64 = r.iter().sum();
            assert::close(sum, 1.0, 1E-8);
        }
        assert_eq!(cpd.len(), 700);
        assert_eq!(cpd.predictive().len(), 701);
    }

    #[test]
    fn detect_obvious_switch() {
        let data = jump(700);
        let mut cpd = BayesOnline::new(
            Hazard::default(),
            StudentT::new(1.0, 1.0, 1.0, 0.0).unwrap(),
        );
        for x in &data {
            cpd.update(*x).unwrap();
        }
        let change_points = cpd.map_changepoints();
        assert_eq!(change_points.first(), Some(&0));
        assert!(change_points.iter().any(|c| (499..=501).contains(c)));

        let p_cp = cpd.changepoint_probabilities(5).unwrap();
        assert_eq!(p_cp.len(), 700 - 5);
        assert!(p_cp.slice(s![499..=501]).sum() > 0.5);
    }

    #[test]
    fn three_segments_detected() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let data = generators::three_segments(&mut rng);
        let mut cpd = detector();
        let p = cpd.find_changepoints(&data, 5).unwrap();
        assert_eq!(p.len(), data.len() - 5);
        assert!(p.slice(s![29..=31]).sum() > 0.5);
        assert!(p.slice(s![5..25]).iter().all(|&v| v < 0.5));
    }

    #[test]
    fn reset_equals_fresh() {
        let data = jump(50);
        let mut cpd = detector();
        for x in &data {
            cpd.update(*x).unwrap();
        }
        cpd.reset();
        assert_eq!(cpd, detector());
        assert!(cpd.is_empty());
        assert_eq!(cpd.get_probabilities(0).unwrap(), &[1.0]);
    }

    #[test]
    fn find_changepoints_is_repeatable() {
        let data = jump(120);
        let mut cpd = detector();
        let first = cpd.find_changepoints(&data, 3).unwrap();
        let second = cpd.find_changepoints(&data, 3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn engines_agree() {
        let data = jump(80);
        let mut reference = detector().with_engine(Engine::Reference);
        let mut accelerated = detector().with_engine(Engine::Accelerated);
        for x in &data {
            let a = accelerated.update(*x).unwrap().to_vec();
            let b = reference.update(*x).unwrap();
            for (p, q) in a.iter().zip(b.iter()) {
                assert::close(*p, *q, 1e-6);
            }
        }
    }

    #[test]
    fn non_finite_update_is_atomic() {
        let mut cpd = detector();
        cpd.update(1.0).unwrap();
        cpd.update(1.5).unwrap();
        let before = cpd.clone();
        assert!(matches!(
            cpd.update(f64::NAN),
            Err(CpdError::NonFinite { index: 2, .. })
        ));
        assert_eq!(cpd, before);

        let err = cpd
            .find_changepoints(&[1.0, f64::INFINITY, 2.0], 0)
            .unwrap_err();
        assert_eq!(
            err,
            CpdError::NonFinite {
                index: 1,
                value: f64::INFINITY
            }
        );
        assert_eq!(cpd, before);
    }

    #[test]
    fn extreme_finite_sample_is_accepted() {
        for engine in [Engine::Reference, Engine::Accelerated] {
            let mut cpd = BayesOnline::new(
                Hazard::default(),
                StudentT::new(1.0, 1.0, 1.0, 0.0).unwrap(),
            )
            .with_engine(engine);
            for x in [0.1, -0.2, 0.05] {
                cpd.update(x).unwrap();
            }
            let r = cpd.update(1e160).unwrap();
            assert_eq!(r.len(), 5);
            assert!(r.iter().all(|p| p.is_finite() && *p >= 0.0));
            assert::close(r.iter().sum::<f64>(), 1.0, 1e-8);
            assert_eq!(cpd.len(), 4);

            let r = cpd.update(0.0).unwrap();
            assert::close(r.iter().sum::<f64>(), 1.0, 1e-8);
        }
    }

    #[test]
    fn history_queries() {
        let mut cpd = detector();
        for x in [1.0, 1.1, 0.9, 8.0] {
            cpd.update(x).unwrap();
        }
        assert_eq!(cpd.get_probabilities(4).unwrap().len(), 5);
        assert_eq!(
            cpd.get_probabilities(5),
            Err(CpdError::OutOfBounds { index: 5, len: 4 })
        );
        assert_eq!(cpd.changepoint_probabilities(4).unwrap().len(), 0);
        assert!(cpd.changepoint_probabilities(5).is_err());

        let m = cpd.probability_matrix();
        assert_eq!(m.dim(), (5, 5));
        assert_eq!(m[[0, 0]], 1.0);
        assert_eq!(m[[3, 2]], 0.0);
        for k in 0..5 {
            assert::close(m.column(k).sum(), 1.0, 1e-12);
        }

        let windows = window_over_threshold(&cpd.history, 2, 0.5);
        assert!(windows.iter().all(|&i| i <= 4));
    }

    #[test]
    fn configuration_by_name() {
        let cpd = BayesOnline::from_names("const", &[250.0], "student_t", &[0.1, 0.01, 1.0, 0.0])
            .unwrap();
        assert_eq!(cpd, detector());
        let logistic = BayesOnline::from_names("logistic", &[-4.0, 0.1, -2.0], "t", &[1.0, 1.0, 1.0, 0.0])
            .unwrap();
        assert_eq!(
            logistic.hazard(),
            Hazard::Logistic {
                h: -4.0,
                a: 0.1,
                b: -2.0
            }
        );
        assert!(matches!(
            BayesOnline::from_names("const", &[250.0], "poisson", &[]),
            Err(CpdError::UnknownModel { kind: "observation", .. })
        ));
        assert!(BayesOnline::from_names("const", &[0.0], "t", &[0.1, 0.01, 1.0, 0.0]).is_err());
    }

    #[cfg(feature = "serde1")]
    #[test]
    fn serde_round_trip() {
        let mut cpd = detector();
        for x in [1.0, 2.0, 30.0] {
            cpd.update(x).unwrap();
        }
        let json = serde_json::to_string(&cpd).unwrap();
        let restored: BayesOnline = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, cpd);
    }
}
