//! Utils
//!
//! Small helper functions shared across the crate.
use crate::errors::ConfluenceError;

/// Round a number to a given decimal precision.
///
/// * `n` - The number to round.
/// * `precision` - Decimal places to keep.
pub fn precision_round(n: f64, precision: i32) -> f64 {
    let p = (10.0_f64).powi(precision);
    (n * p).round() / p
}

/// Arithmetic mean of a slice.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Check that two aligned inputs have the same length.
///
/// * `what` - Label used in the error message.
/// * `expected` - Length of the reference input.
/// * `got` - Length of the other input.
pub fn validate_aligned(what: &'static str, expected: usize, got: usize) -> Result<(), ConfluenceError> {
    if expected == got {
        Ok(())
    } else {
        Err(ConfluenceError::Dimension(what, expected, got))
    }
}
