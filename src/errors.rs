//! Errors
//!
//! Custom error types used throughout the `confluence` crate.
use thiserror::Error;

/// Errors that can occur while fitting, calibrating, or predicting intervals.
#[derive(Debug, Error)]
pub enum ConfluenceError {
    /// Operation invoked out of lifecycle order.
    #[error("`{0}` requires `{1}` to have been called first.")]
    State(&'static str, &'static str),
    /// Mismatched input lengths.
    #[error("Mismatched lengths for {0}: expected {1} but {2} were provided.")]
    Dimension(&'static str, usize, usize),
    /// Dispersion prediction not strictly positive, so a conformity score
    /// cannot be formed.
    #[error("Dispersion prediction {1} at row {0} is not strictly positive, conformity scores are undefined.")]
    DegenerateDispersion(usize, f64),
    /// Non-positive or non-finite weight.
    #[error("Weight {1} at position {0} is not a strictly positive finite number.")]
    InvalidWeight(usize, f64),
    /// No variance in a feature.
    #[error("Feature number {0} has no variance, the design matrix is singular.")]
    NoVariance(usize),
    /// Invalid value parsing.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Unable to write model to file.
    #[error("Unable to write model to file: {0}")]
    UnableToWrite(String),
    /// Unable to read model from file.
    #[error("Unable to read model from a file {0}")]
    UnableToRead(String),
}
