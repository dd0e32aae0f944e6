use crate::linalg::LinalgError;
use thiserror::Error;

/// Error type covering configuration validation and in-run failures.
///
/// Configuration errors (`DimensionMismatch`, `InvalidParameter`) surface at
/// the setter that introduced them, before any sweep runs. `NumericalFailure`
/// aborts an in-progress run; no partial draw collection is ever returned.
#[derive(Debug, Error)]
pub enum BqrError {
    #[error("Dimension mismatch for {what}: expected {expected}, found {found}.")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Numerical failure in the {context}: {detail}")]
    NumericalFailure {
        context: &'static str,
        detail: String,
    },

    #[error("Internal invariant violation: {0}")]
    InternalInvariantViolation(String),
}

impl BqrError {
    /// Tag a factorization error with the matrix it came from.
    pub(crate) fn numerical(context: &'static str) -> impl FnOnce(LinalgError) -> BqrError {
        move |source| BqrError::NumericalFailure {
            context,
            detail: source.to_string(),
        }
    }
}
