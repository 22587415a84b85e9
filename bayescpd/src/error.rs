//! Error types shared by both detectors.

use thiserror::Error;

/// Result type alias for changepoint operations.
pub type Result<T> = std::result::Result<T, CpdError>;

/// Errors raised by model construction, detector updates and queries.
///
/// Configuration errors are raised when a model or detector is built,
/// numerical errors at the `update`/`find_changepoints` boundary before any
/// state is touched, and bounds errors by history queries. None of them leave
/// a detector in an inconsistent state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CpdError {
    /// A model name did not match any supported variant.
    #[error("unknown {kind} model: {name:?}")]
    UnknownModel {
        /// Which family was being looked up (likelihood, prior, ...).
        kind: &'static str,
        /// The offending name.
        name: String,
    },

    /// A model parameter is outside its domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Too few numeric parameters were supplied for a named model.
    #[error("{model} needs {expected} parameter(s), got {got}")]
    MissingParameter {
        /// Model name.
        model: &'static str,
        /// Number of parameters required.
        expected: usize,
        /// Number of parameters supplied.
        got: usize,
    },

    /// Series dimensionality does not match the configured one.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Configured number of columns.
        expected: usize,
        /// Number of columns in the supplied data.
        got: usize,
    },

    /// A sample is NaN or infinite.
    #[error("non-finite sample {value} at index {index}")]
    NonFinite {
        /// Position of the sample in the series (or update count online).
        index: usize,
        /// The rejected value.
        value: f64,
    },

    /// A history query asked for a step that has not been processed.
    #[error("index out of bounds: {index} (processed: {len})")]
    OutOfBounds {
        /// Requested step.
        index: usize,
        /// Number of processed samples.
        len: usize,
    },

    /// The computation produced no usable probability mass.
    #[error("numerical error: {0}")]
    Numerical(String),
}

/// Reject the first non-finite entry of `values`.
pub(crate) fn ensure_finite<'a, I>(values: I) -> Result<()>
where
    I: IntoIterator<Item = &'a f64>,
{
    match values.into_iter().enumerate().find(|(_, v)| !v.is_finite()) {
        Some((index, &value)) => Err(CpdError::NonFinite { index, value }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = CpdError::UnknownModel {
            kind: "likelihood",
            name: "poisson".to_string(),
        };
        assert_eq!(err.to_string(), "unknown likelihood model: \"poisson\"");

        let err = CpdError::OutOfBounds { index: 12, len: 10 };
        assert_eq!(err.to_string(), "index out of bounds: 12 (processed: 10)");

        let err = CpdError::DimensionMismatch {
            expected: 2,
            got: 3,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 2, got 3");
    }

    #[test]
    fn ensure_finite_reports_first_offender() {
        assert!(ensure_finite(&[1.0, 2.0, 3.0]).is_ok());
        let err = ensure_finite(&[1.0, f64::NAN, f64::INFINITY]).unwrap_err();
        match err {
            CpdError::NonFinite { index, value } => {
                assert_eq!(index, 1);
                assert!(value.is_nan());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
