//! Segment length priors for the offline detector.

use crate::error::{CpdError, Result};
use crate::numeric::ln_binomial;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Prior probability of a segment having a given length.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Prior {
    /// Uniform `1 / (n + 1)` where `n` is the series length.
    Const,
    /// Geometric `(1 - p)^(t - 1) p`, i.e. a constant hazard `p`.
    Geometric {
        /// Per-step changepoint probability.
        p: f64,
    },
    /// `C(t - k, k - 1) p^k (1 - p)^(t - k)`: changepoints cannot recur within
    /// a minimum dwell time of `k` steps.
    NegBinomial {
        /// Minimum dwell time.
        k: usize,
        /// Per-step changepoint probability.
        p: f64,
    },
}

impl Prior {
    /// Geometric prior with validated `p`.
    ///
    /// # Errors
    /// `p` must lie in `(0, 1]`.
    pub fn geometric(p: f64) -> Result<Self> {
        check_probability(p)?;
        Ok(Self::Geometric { p })
    }

    /// Negative binomial prior with validated parameters.
    ///
    /// # Errors
    /// `k` must be positive and `p` must lie in `(0, 1]`.
    pub fn neg_binomial(k: usize, p: f64) -> Result<Self> {
        if k == 0 {
            return Err(CpdError::InvalidParameter(
                "dwell time k must be positive".to_string(),
            ));
        }
        check_probability(p)?;
        Ok(Self::NegBinomial { k, p })
    }

    /// Look a prior up by name.
    ///
    /// `"const"` takes no parameters, `"geometric"` takes `[p]` and
    /// `"neg_binomial"` takes `[k, p]`.
    ///
    /// # Errors
    /// Unknown names, missing parameters and out-of-domain values.
    pub fn from_name(name: &str, params: &[f64]) -> Result<Self> {
        match name {
            "const" => Ok(Self::Const),
            "geometric" => {
                let [p] = take::<1>("geometric", params)?;
                Self::geometric(p)
            }
            "neg_binomial" => {
                let [k, p] = take::<2>("neg_binomial", params)?;
                if !(k.is_finite() && k >= 1.0 && k.fract() == 0.0) {
                    return Err(CpdError::InvalidParameter(format!(
                        "dwell time k must be a positive integer, got {k}"
                    )));
                }
                Self::neg_binomial(k as usize, p)
            }
            other => Err(CpdError::UnknownModel {
                kind: "prior",
                name: other.to_string(),
            }),
        }
    }

    /// Natural log of the prior for a segment of length `t` in a series of
    /// length `n`.
    #[must_use]
    pub fn ln_probability(&self, t: usize, n: usize) -> f64 {
        match *self {
            Self::Const => -((n + 1) as f64).ln(),
            Self::Geometric { p } => {
                if t == 0 {
                    f64::NEG_INFINITY
                } else {
                    powi_ln((-p).ln_1p(), t - 1) + p.ln()
                }
            }
            Self::NegBinomial { k, p } => {
                if t < k {
                    return f64::NEG_INFINITY;
                }
                let c = ln_binomial((t - k) as i64, k as i64 - 1);
                if c == f64::NEG_INFINITY {
                    return c;
                }
                c + powi_ln(p.ln(), k) + powi_ln((-p).ln_1p(), t - k)
            }
        }
    }

    /// Prior for a segment of length `t` in a series of length `n`.
    #[must_use]
    pub fn probability(&self, t: usize, n: usize) -> f64 {
        self.ln_probability(t, n).exp()
    }
}

/// `ln(x^count)` given `ln x`, with `x^0 = 1` even for `x = 0`.
fn powi_ln(ln_x: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        count as f64 * ln_x
    }
}

fn check_probability(p: f64) -> Result<()> {
    if p > 0.0 && p <= 1.0 {
        Ok(())
    } else {
        Err(CpdError::InvalidParameter(format!(
            "probability p must lie in (0, 1], got {p}"
        )))
    }
}

pub(crate) fn take<const N: usize>(model: &'static str, params: &[f64]) -> Result<[f64; N]> {
    params
        .get(..N)
        .and_then(|head| <[f64; N]>::try_from(head).ok())
        .ok_or(CpdError::MissingParameter {
            model,
            expected: N,
            got: params.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_prior() {
        assert::close(Prior::Const.probability(4, 99), 0.01, 1e-12);
        assert::close(Prior::Const.probability(70, 99), 0.01, 1e-12);
    }

    #[test]
    fn geometric_prior() {
        let prior = Prior::geometric(0.1).unwrap();
        assert::close(prior.probability(4, 0), 0.9_f64.powi(3) * 0.1, 1e-12);
        assert::close(prior.probability(1, 0), 0.1, 1e-12);
        assert_eq!(prior.probability(0, 0), 0.0);

        let certain = Prior::geometric(1.0).unwrap();
        assert::close(certain.probability(1, 0), 1.0, 1e-12);
        assert_eq!(certain.probability(2, 0), 0.0);
    }

    #[test]
    fn neg_binomial_prior() {
        // t < k has no mass
        let prior = Prior::neg_binomial(100, 0.1).unwrap();
        assert_eq!(prior.probability(4, 0), 0.0);
        assert!(!prior.ln_probability(4, 0).is_nan());

        // C(7, 2) 0.5^3 0.5^7
        let prior = Prior::neg_binomial(3, 0.5).unwrap();
        assert::close(prior.probability(10, 0), 21.0 * 0.5_f64.powi(10), 1e-12);

        // C(t - k, k - 1) vanishes while t - k < k - 1
        assert_eq!(prior.probability(4, 0), 0.0);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(Prior::geometric(0.0).is_err());
        assert!(Prior::geometric(1.5).is_err());
        assert!(Prior::geometric(f64::NAN).is_err());
        assert!(Prior::neg_binomial(0, 0.5).is_err());
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(Prior::from_name("const", &[]).unwrap(), Prior::Const);
        assert_eq!(
            Prior::from_name("geometric", &[0.2]).unwrap(),
            Prior::Geometric { p: 0.2 }
        );
        assert_eq!(
            Prior::from_name("neg_binomial", &[5.0, 0.2]).unwrap(),
            Prior::NegBinomial { k: 5, p: 0.2 }
        );
        assert!(matches!(
            Prior::from_name("geometric", &[]),
            Err(CpdError::MissingParameter { expected: 1, got: 0, .. })
        ));
        assert!(matches!(
            Prior::from_name("neg_binomial", &[0.0, 0.5]),
            Err(CpdError::InvalidParameter(_))
        ));
        assert!(matches!(
            Prior::from_name("poisson", &[]),
            Err(CpdError::UnknownModel { kind: "prior", .. })
        ));
    }
}
