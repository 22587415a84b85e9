//! Execution path selection.

use crate::error::CpdError;
use std::str::FromStr;

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

/// How the numeric kernels are evaluated.
///
/// Both engines run the same formulas and agree to floating-point noise.
/// `Reference` recomputes every segment statistic from the raw rows and runs
/// sequentially; `Accelerated` carries running statistics along the dynamic
/// program, evaluates the Student-t density in closed form and spreads the
/// full-output recursion over the rayon pool.
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Engine {
    /// Straightforward evaluation, used to validate the accelerated path.
    Reference,
    /// Incremental and parallel evaluation.
    #[default]
    Accelerated,
}

impl FromStr for Engine {
    type Err = CpdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reference" => Ok(Self::Reference),
            "accelerated" => Ok(Self::Accelerated),
            other => Err(CpdError::UnknownModel {
                kind: "engine",
                name: other.to_string(),
            }),
        }
    }
}
