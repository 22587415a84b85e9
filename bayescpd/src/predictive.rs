//! Student-t posterior predictive for Gaussian data with unknown mean and
//! variance under a Normal-Gamma prior.

use crate::engine::Engine;
use crate::error::{CpdError, Result};
use ndarray::{Array1, ArrayView1, Zip};
use rv::prelude::{Rv, StudentsT as RvStudentsT};
use special::Gamma;
use std::f64::consts::PI;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Location-scale Student's t built on the standard `rv` distribution.
#[derive(Clone, Debug, PartialEq)]
pub struct LocScaleT {
    st: RvStudentsT,
    df: f64,
    loc: f64,
    scale: f64,
}

impl LocScaleT {
    /// Create a new `LocScaleT` with `df` degrees of freedom.
    #[must_use]
    pub fn new(df: f64, loc: f64, scale: f64) -> Self {
        Self {
            st: RvStudentsT::new_unchecked(df),
            df,
            loc,
            scale,
        }
    }
}

impl Rv<f64> for LocScaleT {
    fn ln_f(&self, x: &f64) -> f64 {
        let z = (x - self.loc) / self.scale;
        let ln_f = self.st.ln_f(&z) - self.scale.ln();
        if ln_f == f64::NEG_INFINITY && z.is_finite() {
            // the standard kernel squares z and overflows far out in the tails
            ln_t_pdf(*x, self.df, self.loc, self.scale)
        } else {
            ln_f
        }
    }

    fn draw<R: rand::Rng>(&self, rng: &mut R) -> f64 {
        let z: f64 = self.st.draw(rng);
        z * self.scale + self.loc
    }
}

/// Closed-form log density of a location-scale Student's t.
#[must_use]
pub fn ln_t_pdf(x: f64, df: f64, loc: f64, scale: f64) -> f64 {
    let z = (x - loc) / scale;
    let ln_kernel = if z.abs() < 1e150 {
        (z * z / df).ln_1p()
    } else {
        // z * z overflows; 1 + z²/df equals z²/df at double precision
        2.0 * ((x - loc).abs().ln() - scale.ln()) - df.ln()
    };
    ((df + 1.0) / 2.0).ln_gamma().0
        - (df / 2.0).ln_gamma().0
        - 0.5 * (df * PI).ln()
        - scale.ln()
        - (df + 1.0) / 2.0 * ln_kernel
}

/// Density of a location-scale Student's t.
#[must_use]
pub fn t_pdf(x: f64, df: f64, loc: f64, scale: f64) -> f64 {
    ln_t_pdf(x, df, loc, scale).exp()
}

/// Normal-Gamma hyperparameters for every active run length.
///
/// Entry `r` of each buffer holds the posterior after the last `r`
/// observations; entry 0 always holds the prior.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct StudentT {
    alpha0: f64,
    beta0: f64,
    kappa0: f64,
    mu0: f64,
    alpha: Vec<f64>,
    beta: Vec<f64>,
    kappa: Vec<f64>,
    mu: Vec<f64>,
}

impl Default for StudentT {
    fn default() -> Self {
        Self {
            alpha0: 0.1,
            beta0: 0.01,
            kappa0: 1.0,
            mu0: 0.0,
            alpha: vec![0.1],
            beta: vec![0.01],
            kappa: vec![1.0],
            mu: vec![0.0],
        }
    }
}

impl StudentT {
    /// Create the predictive from prior hyperparameters.
    ///
    /// # Example
    /// ```rust
    /// use bayescpd::StudentT;
    ///
    /// let mut t = StudentT::new(0.1, 0.01, 1.0, 0.0).unwrap();
    /// t.update_theta(117.64).unwrap();
    /// assert_eq!(t.alpha(), &[0.1, 0.6]);
    /// assert_eq!(t.kappa(), &[1.0, 2.0]);
    /// ```
    ///
    /// # Errors
    /// `alpha`, `beta` and `kappa` must be finite and positive, `mu` finite.
    pub fn new(alpha: f64, beta: f64, kappa: f64, mu: f64) -> Result<Self> {
        let positive = [alpha, beta, kappa]
            .iter()
            .all(|x| x.is_finite() && *x > 0.0);
        if !positive || !mu.is_finite() {
            return Err(CpdError::InvalidParameter(format!(
                "student-t prior needs finite alpha, beta, kappa > 0 and finite mu, \
                 got ({alpha}, {beta}, {kappa}, {mu})"
            )));
        }
        Ok(Self {
            alpha0: alpha,
            beta0: beta,
            kappa0: kappa,
            mu0: mu,
            alpha: vec![alpha],
            beta: vec![beta],
            kappa: vec![kappa],
            mu: vec![mu],
        })
    }

    /// Build from `[alpha, beta, kappa, mu]`.
    ///
    /// # Errors
    /// Too few parameters or values outside their domain.
    pub fn from_params(params: &[f64]) -> Result<Self> {
        let [alpha, beta, kappa, mu] = crate::prior::take::<4>("student_t", params)?;
        Self::new(alpha, beta, kappa, mu)
    }

    /// Number of active run lengths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alpha.len()
    }

    /// Always false; the prior entry is never removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alpha.is_empty()
    }

    /// Shape parameters.
    #[must_use]
    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    /// Rate parameters.
    #[must_use]
    pub fn beta(&self) -> &[f64] {
        &self.beta
    }

    /// Pseudo-observation counts.
    #[must_use]
    pub fn kappa(&self) -> &[f64] {
        &self.kappa
    }

    /// Posterior means.
    #[must_use]
    pub fn mu(&self) -> &[f64] {
        &self.mu
    }

    /// Prior hyperparameters `(alpha0, beta0, kappa0, mu0)`.
    #[must_use]
    pub fn prior(&self) -> (f64, f64, f64, f64) {
        (self.alpha0, self.beta0, self.kappa0, self.mu0)
    }

    /// Predictive density of `x` for every run length, reference path.
    #[must_use]
    pub fn pdf(&self, x: f64) -> Array1<f64> {
        self.pdf_with(Engine::Reference, x)
    }

    /// Predictive density of `x` for every run length.
    ///
    /// Degrees of freedom `2α`, location `μ`, scale `sqrt(β(κ+1)/(ακ))`.
    #[must_use]
    pub fn pdf_with(&self, engine: Engine, x: f64) -> Array1<f64> {
        self.ln_pdf_with(engine, x).mapv_into(f64::exp)
    }

    /// Predictive log density of `x` for every run length.
    #[must_use]
    pub fn ln_pdf_with(&self, engine: Engine, x: f64) -> Array1<f64> {
        let alpha = ArrayView1::from(&self.alpha[..]);
        let beta = ArrayView1::from(&self.beta[..]);
        let kappa = ArrayView1::from(&self.kappa[..]);
        let mu = ArrayView1::from(&self.mu[..]);
        let zip = Zip::from(&alpha).and(&beta).and(&kappa).and(&mu);
        match engine {
            Engine::Reference => zip.map_collect(|&a, &b, &k, &m| {
                LocScaleT::new(2.0 * a, m, predictive_scale(a, b, k)).ln_f(&x)
            }),
            Engine::Accelerated => zip.map_collect(|&a, &b, &k, &m| {
                ln_t_pdf(x, 2.0 * a, m, predictive_scale(a, b, k))
            }),
        }
    }

    /// Condition every run length on `x` and open a fresh run at the prior.
    ///
    /// # Errors
    /// A non-finite `x` is rejected and leaves the state unchanged.
    pub fn update_theta(&mut self, x: f64) -> Result<()> {
        if !x.is_finite() {
            return Err(CpdError::NonFinite {
                index: self.len() - 1,
                value: x,
            });
        }
        let n = self.len();
        self.alpha.push(0.0);
        self.beta.push(0.0);
        self.kappa.push(0.0);
        self.mu.push(0.0);
        for r in (1..=n).rev() {
            let (a, b, k, m) = (
                self.alpha[r - 1],
                self.beta[r - 1],
                self.kappa[r - 1],
                self.mu[r - 1],
            );
            self.mu[r] = (k * m + x) / (k + 1.0);
            self.kappa[r] = k + 1.0;
            self.alpha[r] = a + 0.5;
            self.beta[r] = b + k * (x - m).powi(2) / (2.0 * (k + 1.0));
        }
        self.alpha[0] = self.alpha0;
        self.beta[0] = self.beta0;
        self.kappa[0] = self.kappa0;
        self.mu[0] = self.mu0;
        Ok(())
    }

    /// Drop every posterior, keeping only the prior entry.
    pub fn reset(&mut self) {
        for buf in [
            &mut self.alpha,
            &mut self.beta,
            &mut self.kappa,
            &mut self.mu,
        ] {
            buf.truncate(1);
        }
        self.alpha[0] = self.alpha0;
        self.beta[0] = self.beta0;
        self.kappa[0] = self.kappa0;
        self.mu[0] = self.mu0;
    }
}

#[inline]
fn predictive_scale(alpha: f64, beta: f64, kappa: f64) -> f64 {
    (beta * (kappa + 1.0) / (alpha * kappa)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// First sample of the three-segment fixture signal.
    const X0: f64 = 117.640_523_459_676_64;
    const X1: f64 = 104.001_572_083_672_23;

    fn fixture() -> StudentT {
        StudentT::new(0.1, 0.01, 1.0, 0.0).unwrap()
    }

    #[test]
    fn update_theta_regression() {
        let mut t = fixture();
        t.update_theta(X0).unwrap();
        assert_eq!(t.len(), 2);
        assert::close(t.alpha()[0], 0.1, 1e-12);
        assert::close(t.alpha()[1], 0.6, 1e-12);
        assert::close(t.kappa()[0], 1.0, 1e-12);
        assert::close(t.kappa()[1], 2.0, 1e-12);
        assert::close(t.beta()[0], 0.01, 1e-12);
        assert::close(t.beta()[1], 3459.833_19, 1e-4);
        assert::close(t.mu()[0], 0.0, 1e-12);
        assert::close(t.mu()[1], 58.820_261_73, 1e-6);
    }

    #[test]
    fn pdf_regression() {
        let mut t = fixture();
        t.update_theta(X0).unwrap();
        for engine in [Engine::Reference, Engine::Accelerated] {
            let p = t.pdf_with(engine, X0);
            assert::close(p[0], 0.000_209_687_269_660_813_2, 1e-10);
            assert::close(p[1], 0.002_578_068_769_242_513_2, 1e-10);
        }
    }

    #[test]
    fn engines_agree() {
        let mut t = fixture();
        for x in [X0, X1, 98.0, 35.2, 31.0, 29.5] {
            t.update_theta(x).unwrap();
            for probe in [x, 0.0, 60.0] {
                let reference = t.pdf_with(Engine::Reference, probe);
                let accelerated = t.pdf_with(Engine::Accelerated, probe);
                for (a, b) in accelerated.iter().zip(reference.iter()) {
                    assert::close(*a, *b, 1e-6 * b.abs().max(1e-300));
                }
            }
        }
    }

    #[test]
    fn t_pdf_matches_reference_density() {
        assert::close(t_pdf(10.0, 2.0, 3.0, 2.0), 0.009_294_963_909_228_375, 1e-12);
        let rv_path = LocScaleT::new(2.0, 3.0, 2.0).f(&10.0);
        assert::close(rv_path, t_pdf(10.0, 2.0, 3.0, 2.0), 1e-12);
    }

    #[test]
    fn log_density_survives_extreme_samples() {
        let mut t = StudentT::new(1.0, 1.0, 1.0, 0.0).unwrap();
        for x in [0.1, -0.2, 0.05] {
            t.update_theta(x).unwrap();
        }
        for engine in [Engine::Reference, Engine::Accelerated] {
            let ln_p = t.ln_pdf_with(engine, 1e160);
            assert!(ln_p.iter().all(|v| v.is_finite()));
            assert!(t.pdf_with(engine, 1e160).iter().all(|&v| v == 0.0));
        }
        // both tail branches agree where they meet
        let near = ln_t_pdf(0.999e150, 3.0, 0.0, 1.0);
        let far = ln_t_pdf(1.001e150, 3.0, 0.0, 1.0);
        assert::close(near - far, 4.0 * (1.001_f64 / 0.999).ln(), 1e-9);
    }

    #[test]
    fn reset_restores_prior() {
        let mut t = fixture();
        t.update_theta(X0).unwrap();
        t.update_theta(X1).unwrap();
        assert_eq!(t.len(), 3);
        t.reset();
        assert_eq!(t, fixture());
    }

    #[test]
    fn non_finite_update_leaves_state() {
        let mut t = fixture();
        t.update_theta(X0).unwrap();
        let before = t.clone();
        assert!(t.update_theta(f64::NAN).is_err());
        assert!(t.update_theta(f64::NEG_INFINITY).is_err());
        assert_eq!(t, before);
    }

    #[test]
    fn default_prior() {
        assert_eq!(StudentT::default(), fixture());
    }

    #[test]
    fn invalid_prior() {
        assert!(StudentT::new(0.0, 0.01, 1.0, 0.0).is_err());
        assert!(StudentT::new(0.1, -1.0, 1.0, 0.0).is_err());
        assert!(StudentT::new(0.1, 0.01, 1.0, f64::NAN).is_err());
        assert!(matches!(
            StudentT::from_params(&[0.1, 0.01]),
            Err(CpdError::MissingParameter { expected: 4, .. })
        ));
    }

    #[test]
    fn draws_center_on_location() {
        let mut rng = StdRng::seed_from_u64(0xABCD);
        let dist = LocScaleT::new(30.0, 5.0, 0.5);
        let draws: Vec<f64> = dist.sample(2000, &mut rng);
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        assert::close(mean, 5.0, 0.1);
    }
}
