//! Interval Metrics
//!
//! Empirical evaluation of predicted intervals against ground truth:
//! coverage (with inclusive bounds) and average width, for both the
//! weighted and the baseline interval arrays.
use crate::calibrator::PredictionIntervals;
use crate::errors::ConfluenceError;
use crate::utils::validate_aligned;
use serde::{Deserialize, Serialize};

/// Coverage and width summary for a batch of intervals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntervalMetrics {
    /// Share of truths inside the weighted intervals.
    pub coverage: f64,
    /// Share of truths inside the baseline intervals.
    pub coverage_baseline: f64,
    /// Mean width of the weighted intervals.
    pub width: f64,
    /// Mean width of the baseline intervals.
    pub width_baseline: f64,
}

/// Share of `y` values inside `[lower, upper]`, bounds inclusive.
pub fn empirical_coverage(y: &[f64], lower: &[f64], upper: &[f64]) -> Result<f64, ConfluenceError> {
    validate_aligned("truth and lower bounds", y.len(), lower.len())?;
    validate_aligned("truth and upper bounds", y.len(), upper.len())?;
    let hits = y
        .iter()
        .zip(lower.iter().zip(upper.iter()))
        .filter(|(y_, (lo, hi))| *lo <= *y_ && *y_ <= *hi)
        .count();
    Ok(hits as f64 / y.len() as f64)
}

/// Mean of `upper - lower`.
pub fn mean_interval_width(lower: &[f64], upper: &[f64]) -> Result<f64, ConfluenceError> {
    validate_aligned("lower and upper bounds", lower.len(), upper.len())?;
    let total: f64 = lower.iter().zip(upper.iter()).map(|(lo, hi)| hi - lo).sum();
    Ok(total / lower.len() as f64)
}

/// Evaluate weighted and baseline intervals against ground truth.
///
/// * `y` - Observed responses for the test points.
/// * `lower`, `upper` - Weighted interval bounds.
/// * `baseline_lower`, `baseline_upper` - Unweighted interval bounds.
pub fn evaluate(
    y: &[f64],
    lower: &[f64],
    upper: &[f64],
    baseline_lower: &[f64],
    baseline_upper: &[f64],
) -> Result<IntervalMetrics, ConfluenceError> {
    Ok(IntervalMetrics {
        coverage: empirical_coverage(y, lower, upper)?,
        coverage_baseline: empirical_coverage(y, baseline_lower, baseline_upper)?,
        width: mean_interval_width(lower, upper)?,
        width_baseline: mean_interval_width(baseline_lower, baseline_upper)?,
    })
}

/// Evaluate a [`PredictionIntervals`] batch against ground truth.
pub fn evaluate_intervals(y: &[f64], intervals: &PredictionIntervals) -> Result<IntervalMetrics, ConfluenceError> {
    evaluate(
        y,
        &intervals.lower,
        &intervals.upper,
        &intervals.baseline_lower,
        &intervals.baseline_upper,
    )
}
