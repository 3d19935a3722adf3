//! Conformal Calibrator
//!
//! Weighted split-conformal calibration over two data sources: the point
//! and dispersion models are fitted on a non-probability sample, conformity
//! scores are computed on a probability sample, and per-test-point
//! intervals come from inclusion-probability-weighted quantiles of those
//! scores. An unweighted exchangeable baseline interval is produced
//! alongside for comparison.
use crate::data::Matrix;
use crate::errors::ConfluenceError;
use crate::quantile::{validate_weights, weighted_quantile, CalibrationScores};
use crate::regressor::Regressor;
use crate::utils::validate_aligned;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Default miscoverage level.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Prediction intervals for a batch of test points.
///
/// `lower`/`upper` are the covariate-shift-adjusted bounds, computed with a
/// per-point weighted quantile. `baseline_lower`/`baseline_upper` assume
/// exchangeability and share a single precomputed quantile across the
/// batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionIntervals {
    /// Point predictions.
    pub point: Vec<f64>,
    /// Weighted lower bounds.
    pub lower: Vec<f64>,
    /// Weighted upper bounds.
    pub upper: Vec<f64>,
    /// Unweighted (exchangeable) lower bounds.
    pub baseline_lower: Vec<f64>,
    /// Unweighted (exchangeable) upper bounds.
    pub baseline_upper: Vec<f64>,
}

// State stored by `calibrate` and read by `predict`. The scores vector
// always holds the calibration scores plus the trailing +inf sentinel,
// which guarantees the upper tail mass for finite-sample validity.
#[derive(Debug, Clone)]
struct CalibrationState {
    scores: Vec<f64>,
    weights: Vec<f64>,
    sorted: CalibrationScores,
    equal_quantile: f64,
}

/// Weighted split-conformal calibrator.
///
/// Lifecycle: `fit` trains the point model and, on the absolute training
/// residuals, the dispersion model. `calibrate` scores a probability
/// sample and stores the (score, weight) state. `predict` turns point and
/// dispersion predictions into intervals, one weighted quantile per test
/// point. Operations called out of order fail with a state error.
pub struct ConformalCalibrator<P, D> {
    alpha: f64,
    point_model: P,
    dispersion_model: D,
    fitted: bool,
    calibration: Option<CalibrationState>,
}

impl<P, D> ConformalCalibrator<P, D>
where
    P: Regressor,
    D: Regressor,
{
    /// Create a new calibrator around a point model and a dispersion model.
    ///
    /// * `point_model` - Regressor for E[Y|X].
    /// * `dispersion_model` - Regressor for E[|residual| | X].
    pub fn new(point_model: P, dispersion_model: D) -> Self {
        ConformalCalibrator {
            alpha: DEFAULT_ALPHA,
            point_model,
            dispersion_model,
            fitted: false,
            calibration: None,
        }
    }

    /// Set the miscoverage level alpha on the calibrator.
    /// * `alpha` - Miscoverage level in (0, 1); the target level passed to
    ///   quantile computations is `1 - alpha`.
    pub fn set_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// The configured miscoverage level.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// The fitted point model.
    pub fn point_model(&self) -> &P {
        &self.point_model
    }

    /// The fitted dispersion model.
    pub fn dispersion_model(&self) -> &D {
        &self.dispersion_model
    }

    fn validate_alpha(&self) -> Result<(), ConfluenceError> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ConfluenceError::InvalidParameter(
                "alpha".to_string(),
                "a value in (0, 1)".to_string(),
                self.alpha.to_string(),
            ));
        }
        Ok(())
    }

    /// Fit the point model on the training sample, then the dispersion
    /// model on the absolute training residuals.
    ///
    /// * `data` - Training covariates (the non-probability sample).
    /// * `y` - Training response.
    pub fn fit(&mut self, data: &Matrix, y: &[f64]) -> Result<(), ConfluenceError> {
        validate_aligned("training covariates and response", data.rows, y.len())?;
        self.point_model.fit(data, y)?;
        let preds = self.point_model.predict(data);
        let residuals: Vec<f64> = y.iter().zip(preds.iter()).map(|(y_, p)| (y_ - p).abs()).collect();
        self.dispersion_model.fit(data, &residuals)?;
        self.fitted = true;
        // A refit invalidates any calibration done against the old models.
        self.calibration = None;
        info!("Fitted point and dispersion models on {} training records.", data.rows);
        Ok(())
    }

    /// Score the calibration sample and store the calibration state.
    ///
    /// Conformity scores are `|y - point| / dispersion`; the sentinel score
    /// `+inf` is appended so the stored score sequence always has one more
    /// entry than the calibration sample. The unweighted quantile at level
    /// `1 - alpha` over `n + 1` equal masses is precomputed here and shared
    /// by every baseline interval.
    ///
    /// * `data` - Calibration covariates (the probability sample).
    /// * `y` - Calibration response.
    /// * `weights` - Strictly positive finite weights, typically `1 / pi`.
    pub fn calibrate(&mut self, data: &Matrix, y: &[f64], weights: &[f64]) -> Result<(), ConfluenceError> {
        if !self.fitted {
            return Err(ConfluenceError::State("calibrate", "fit"));
        }
        self.validate_alpha()?;
        validate_aligned("calibration covariates and response", data.rows, y.len())?;
        validate_aligned("calibration covariates and weights", data.rows, weights.len())?;
        validate_weights(weights)?;

        let scores = self.conformity_scores(data, y)?;
        let sorted = CalibrationScores::new(&scores, weights)?;

        let mut scores_with_sentinel = scores;
        scores_with_sentinel.push(f64::INFINITY);
        let equal_weights = vec![1.0; scores_with_sentinel.len()];
        let equal_quantile = weighted_quantile(&scores_with_sentinel, &equal_weights, 1.0 - self.alpha)?;

        debug_assert_eq!(scores_with_sentinel.len(), weights.len() + 1);
        info!(
            "Stored {} calibration scores at alpha = {}.",
            weights.len(),
            self.alpha
        );
        self.calibration = Some(CalibrationState {
            scores: scores_with_sentinel,
            weights: weights.to_vec(),
            sorted,
            equal_quantile,
        });
        Ok(())
    }

    /// Prediction intervals for a batch of test points.
    ///
    /// For test point `i` the calibration weights are augmented with
    /// `test_weights[i]` on the sentinel slot and renormalized, and the
    /// interval is `point ± q_i * dispersion` with `q_i` the weighted
    /// quantile at level `1 - alpha`. The baseline interval reuses the
    /// single unweighted quantile stored by `calibrate`. An unbounded
    /// interval (quantile `+inf`) is a legal outcome when the target level
    /// falls in the sentinel tail.
    ///
    /// * `data` - Test covariates.
    /// * `test_weights` - One strictly positive finite weight per test
    ///   point (under shift, the point's own design weight).
    /// * `parallel` - Compute the per-point quantiles on the rayon thread
    ///   pool; output ordering always matches input ordering.
    pub fn predict(
        &self,
        data: &Matrix,
        test_weights: &[f64],
        parallel: bool,
    ) -> Result<PredictionIntervals, ConfluenceError> {
        let state = match &self.calibration {
            Some(state) => state,
            None => return Err(ConfluenceError::State("predict", "calibrate")),
        };
        validate_aligned("test covariates and weights", data.rows, test_weights.len())?;
        validate_weights(test_weights)?;
        debug_assert_eq!(state.scores.len(), state.weights.len() + 1);

        let point = self.point_model.predict(data);
        let dispersion = self.dispersion_model.predict(data);
        let level = 1.0 - self.alpha;

        let quantiles: Result<Vec<f64>, ConfluenceError> = if parallel {
            test_weights
                .par_iter()
                .map(|w| state.sorted.quantile_with_test_weight(*w, level))
                .collect()
        } else {
            test_weights
                .iter()
                .map(|w| state.sorted.quantile_with_test_weight(*w, level))
                .collect()
        };
        let quantiles = quantiles?;

        let mut intervals = PredictionIntervals {
            point: Vec::with_capacity(data.rows),
            lower: Vec::with_capacity(data.rows),
            upper: Vec::with_capacity(data.rows),
            baseline_lower: Vec::with_capacity(data.rows),
            baseline_upper: Vec::with_capacity(data.rows),
        };
        let mut unbounded = 0;
        for i in 0..data.rows {
            if !(dispersion[i] > 0.0) {
                return Err(ConfluenceError::DegenerateDispersion(i, dispersion[i]));
            }
            if quantiles[i].is_infinite() {
                unbounded += 1;
            }
            let spread = quantiles[i] * dispersion[i];
            let baseline_spread = state.equal_quantile * dispersion[i];
            intervals.point.push(point[i]);
            intervals.lower.push(point[i] - spread);
            intervals.upper.push(point[i] + spread);
            intervals.baseline_lower.push(point[i] - baseline_spread);
            intervals.baseline_upper.push(point[i] + baseline_spread);
        }
        if unbounded > 0 {
            warn!(
                "The target level falls in the sentinel tail for {} of {} test points, those intervals are unbounded.",
                unbounded, data.rows
            );
        }
        Ok(intervals)
    }

    // Normalized conformity scores |y - point| / dispersion.
    fn conformity_scores(&self, data: &Matrix, y: &[f64]) -> Result<Vec<f64>, ConfluenceError> {
        let preds = self.point_model.predict(data);
        let dispersion = self.dispersion_model.predict(data);
        let mut scores = Vec::with_capacity(y.len());
        for i in 0..y.len() {
            if !(dispersion[i] > 0.0) {
                return Err(ConfluenceError::DegenerateDispersion(i, dispersion[i]));
            }
            scores.push((y[i] - preds[i]).abs() / dispersion[i]);
        }
        Ok(scores)
    }
}
