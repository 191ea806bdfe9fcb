//! Error taxonomy shared by every selector.
//!
//! Validation failures are raised at `fit` entry before any work begins.
//! Numerical breakdowns found mid-run are converted into one of the fatal
//! variants below. Running out of usable candidates is *not* an error, see
//! [`SelectionStatus::Exhausted`](crate::SelectionStatus::Exhausted).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SelectionError {
    /// Malformed or mismatched input shapes, or non-finite entries.
    #[error("dimension error: {0}")]
    Dimension(String),

    #[error("a property matrix is required when mixing < 1 (got mixing = {mixing})")]
    MissingTarget { mixing: f64 },

    #[error("cannot select {requested} indices from an axis of size {available}")]
    InvalidCount { requested: usize, available: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// CUR found residual diagonal mass but no retained singular direction.
    #[error("residual rank exhausted after {selected} selections")]
    RankExhausted { selected: usize },

    #[error("gram matrix became indefinite (eigenvalue {eigenvalue:e} below tolerance)")]
    IndefiniteGram { eigenvalue: f64 },

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("decomposition failed: {0}")]
    Decomposition(String),

    #[error("selector has not been fitted yet")]
    NotFitted,
}

impl SelectionError {
    /// Fatal errors abort a running selection; everything else is a
    /// validation error raised before the run starts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SelectionError::RankExhausted { .. }
                | SelectionError::IndefiniteGram { .. }
                | SelectionError::InvariantViolation(_)
                | SelectionError::Decomposition(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SelectionError>;
