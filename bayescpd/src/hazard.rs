//! Hazard functions.

use crate::error::{CpdError, Result};
use crate::prior::take;
use ndarray::{Array, ArrayView, Dimension};

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// Probability of a changepoint as a function of the current run length.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Hazard {
    /// A constant hazard `1/λ`.
    /// This is the hazard function that corresponds to a geometric
    /// distribution with timescale λ.
    Constant {
        /// Mean run length.
        lambda: f64,
    },
    /// `logistic(h) * logistic(a * r + b)`
    Logistic {
        /// Logit scaled, scaling factor (increasing increases hazard over the
        /// whole space).
        h: f64,
        /// Slope of the logistic in the run length.
        a: f64,
        /// Translation term (increasing moves the logistic to the left).
        b: f64,
    },
}

impl Default for Hazard {
    fn default() -> Self {
        Self::Constant { lambda: 250.0 }
    }
}

impl Hazard {
    /// Constant hazard with timescale `lambda`.
    ///
    /// # Errors
    /// `lambda` must be finite and at least 1 so that `1/λ` is a probability.
    pub fn constant(lambda: f64) -> Result<Self> {
        if lambda.is_finite() && lambda >= 1.0 {
            Ok(Self::Constant { lambda })
        } else {
            Err(CpdError::InvalidParameter(format!(
                "hazard timescale must be at least 1, got {lambda}"
            )))
        }
    }

    /// Logistic hazard.
    ///
    /// # Errors
    /// All parameters must be finite.
    pub fn logistic(h: f64, a: f64, b: f64) -> Result<Self> {
        if [h, a, b].iter().all(|x| x.is_finite()) {
            Ok(Self::Logistic { h, a, b })
        } else {
            Err(CpdError::InvalidParameter(
                "logistic hazard parameters must be finite".to_string(),
            ))
        }
    }

    /// Look a hazard up by name: `"const"` takes `[lambda]`, `"logistic"`
    /// takes `[h, a, b]`.
    ///
    /// # Errors
    /// Unknown names, missing parameters and out-of-domain values.
    pub fn from_name(name: &str, params: &[f64]) -> Result<Self> {
        match name {
            "const" | "constant" => {
                let [lambda] = take::<1>("const", params)?;
                Self::constant(lambda)
            }
            "logistic" => {
                let [h, a, b] = take::<3>("logistic", params)?;
                Self::logistic(h, a, b)
            }
            other => Err(CpdError::UnknownModel {
                kind: "hazard",
                name: other.to_string(),
            }),
        }
    }

    /// Hazard at a single run length.
    #[must_use]
    pub fn at(&self, run_length: f64) -> f64 {
        match *self {
            Self::Constant { lambda } => lambda.recip(),
            Self::Logistic { h, a, b } => logistic(h) * logistic(a * run_length + b),
        }
    }

    /// Hazard for every run length in `r`, keeping its shape.
    pub fn evaluate<D: Dimension>(&self, r: ArrayView<f64, D>) -> Array<f64, D> {
        r.mapv(|x| self.at(x))
    }
}

#[inline]
fn logistic(x: f64) -> f64 {
    (1.0 + (-x).exp()).recip()
}
