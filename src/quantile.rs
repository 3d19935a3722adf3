//! Weighted Quantile Engine
//!
//! Quantiles of a weight-normalized empirical CDF with linear interpolation
//! between cumulative-fraction knots. This is the only piece of numerical
//! machinery the calibrator depends on: given identical values, weights,
//! and level, the result is bit-reproducible.
use crate::errors::ConfluenceError;
use crate::utils::validate_aligned;

/// Check that every weight is a strictly positive finite number.
pub(crate) fn validate_weights(weights: &[f64]) -> Result<(), ConfluenceError> {
    for (i, &w) in weights.iter().enumerate() {
        if !(w.is_finite() && w > 0.0) {
            return Err(ConfluenceError::InvalidWeight(i, w));
        }
    }
    Ok(())
}

fn validate_level(level: f64) -> Result<(), ConfluenceError> {
    if !(0.0..=1.0).contains(&level) {
        return Err(ConfluenceError::InvalidParameter(
            "level".to_string(),
            "a number in [0, 1]".to_string(),
            level.to_string(),
        ));
    }
    Ok(())
}

/// Weighted quantile of `values` at `level`.
///
/// Pairs are sorted by value ascending (ties keep their input order), the
/// cumulative weight fraction `F_i = cum_i / total` is formed, and the value
/// is linearly interpolated at `F = level` over the resulting piecewise
/// curve. Outside `[F_0, F_last]` the result is clamped to the first or last
/// value.
///
/// `+inf` is a legal value (the calibrator's sentinel score): interpolating
/// into a segment that ends at `+inf` yields `f64::INFINITY`, returned as a
/// value, never as an error.
///
/// * `values` - Values the quantile is taken over.
/// * `weights` - Strictly positive finite mass per value.
/// * `level` - Target level in [0, 1].
pub fn weighted_quantile(values: &[f64], weights: &[f64], level: f64) -> Result<f64, ConfluenceError> {
    validate_aligned("values and weights", values.len(), weights.len())?;
    if values.is_empty() {
        return Err(ConfluenceError::InvalidParameter(
            "values".to_string(),
            "a non-empty sequence".to_string(),
            "0 items".to_string(),
        ));
    }
    validate_weights(weights)?;
    validate_level(level)?;

    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_unstable_by(|a, b| values[*a].total_cmp(&values[*b]).then(a.cmp(b)));

    // Accumulate in sorted order so the cumulative sums are reproducible
    // regardless of the input permutation of tied values.
    let mut sorted = Vec::with_capacity(idx.len());
    let mut cumulative = Vec::with_capacity(idx.len());
    let mut cuml = 0.0;
    for i in idx.iter() {
        sorted.push(values[*i]);
        cuml += weights[*i];
        cumulative.push(cuml);
    }
    let total = cuml;
    let fractions: Vec<f64> = cumulative.iter().map(|c| c / total).collect();
    Ok(interpolate(&sorted, &fractions, level))
}

// Piecewise-linear interpolation of the (fraction, value) curve at `level`.
// `fractions` is non-decreasing; clamps to the first value below `F_0` and
// to the last value above `F_last`.
fn interpolate(sorted: &[f64], fractions: &[f64], level: f64) -> f64 {
    let pos = fractions.partition_point(|f| *f < level);
    if pos == 0 {
        return sorted[0];
    }
    if pos == fractions.len() {
        return sorted[sorted.len() - 1];
    }
    let (f_lo, f_hi) = (fractions[pos - 1], fractions[pos]);
    let (v_lo, v_hi) = (sorted[pos - 1], sorted[pos]);
    // pos is the first fraction >= level, so f_lo < level <= f_hi and the
    // segment has positive width.
    let t = (level - f_lo) / (f_hi - f_lo);
    v_lo + t * (v_hi - v_lo)
}

/// Calibration scores presorted once, with the sentinel `+inf` in the last
/// position and prefix weight sums over the finite scores.
///
/// The sorted order never changes between test points, only the weight
/// attached to the sentinel does, so each per-point augmented quantile
/// reduces to a binary search over fixed prefix sums instead of a fresh
/// sort. Results agree bit-for-bit with [`weighted_quantile`] applied to
/// the augmented arrays, because the prefix sums accumulate in the same
/// order the naive path would.
#[derive(Debug, Clone)]
pub struct CalibrationScores {
    // Ascending finite scores, then f64::INFINITY.
    sorted: Vec<f64>,
    // prefix[i] = total weight of sorted[..=i]; the sentinel carries no
    // mass until a test weight is supplied.
    prefix: Vec<f64>,
    total: f64,
}

impl CalibrationScores {
    /// Build the presorted view from finite calibration scores and their
    /// weights. The sentinel is appended internally.
    pub fn new(scores: &[f64], weights: &[f64]) -> Result<Self, ConfluenceError> {
        validate_aligned("scores and weights", scores.len(), weights.len())?;
        validate_weights(weights)?;

        let mut idx: Vec<usize> = (0..scores.len()).collect();
        idx.sort_unstable_by(|a, b| scores[*a].total_cmp(&scores[*b]).then(a.cmp(b)));

        let mut sorted = Vec::with_capacity(scores.len() + 1);
        let mut prefix = Vec::with_capacity(scores.len());
        let mut cuml = 0.0;
        for i in idx.iter() {
            sorted.push(scores[*i]);
            cuml += weights[*i];
            prefix.push(cuml);
        }
        sorted.push(f64::INFINITY);
        Ok(CalibrationScores {
            sorted,
            prefix,
            total: cuml,
        })
    }

    /// Number of stored scores, sentinel included.
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    /// Always false: the sentinel is present even with no calibration scores.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Weighted quantile with `test_weight` placed on the sentinel slot.
    ///
    /// * `test_weight` - The test point's own weight, appended to the
    ///   calibration weights before normalizing.
    /// * `level` - Target level in [0, 1].
    pub fn quantile_with_test_weight(&self, test_weight: f64, level: f64) -> Result<f64, ConfluenceError> {
        if !(test_weight.is_finite() && test_weight > 0.0) {
            return Err(ConfluenceError::InvalidWeight(self.sorted.len() - 1, test_weight));
        }
        validate_level(level)?;

        let total = self.total + test_weight;
        let pos = self.prefix.partition_point(|c| c / total < level);
        if pos == 0 {
            return Ok(self.sorted[0]);
        }
        let f_lo = self.prefix[pos - 1] / total;
        let v_lo = self.sorted[pos - 1];
        let (f_hi, v_hi) = if pos < self.prefix.len() {
            (self.prefix[pos] / total, self.sorted[pos])
        } else {
            // The sentinel segment: cumulative mass there is exactly the
            // total, so its fraction is 1.
            (1.0, f64::INFINITY)
        };
        let t = (level - f_lo) / (f_hi - f_lo);
        Ok(v_lo + t * (v_hi - v_lo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_equal_weights_hit_knot_exactly() {
        // Cumulative fractions [0.2, 0.4, 0.6, 0.8, 1.0]: level 0.8 lands
        // exactly on the fourth knot.
        let scores = vec![1.0, 2.0, 3.0, 4.0, f64::INFINITY];
        let weights = vec![1.0; 5];
        let q = weighted_quantile(&scores, &weights, 0.8).unwrap();
        assert_eq!(q, 4.0);
    }

    #[test]
    fn test_dominant_test_weight_reaches_sentinel() {
        let scores = vec![1.0, 2.0, 3.0, 4.0, f64::INFINITY];
        let weights = vec![1.0, 1.0, 1.0, 1.0, 100.0];
        let q = weighted_quantile(&scores, &weights, 0.95).unwrap();
        assert!(q >= 4.0);
        assert!(q.is_infinite());
    }

    #[test]
    fn test_monotone_in_level() {
        let values = vec![5.0, 1.0, 3.0, 2.0, 4.0];
        let weights = vec![0.5, 2.0, 1.0, 1.5, 0.25];
        let mut last = f64::NEG_INFINITY;
        for i in 0..=20 {
            let level = i as f64 / 20.0;
            let q = weighted_quantile(&values, &weights, level).unwrap();
            assert!(q >= last);
            last = q;
        }
    }

    #[test]
    fn test_bounds() {
        let values = vec![5.0, 1.0, 3.0, 2.0, 4.0];
        let weights = vec![0.5, 2.0, 1.0, 1.5, 0.25];
        for i in 0..=10 {
            let level = i as f64 / 10.0;
            let q = weighted_quantile(&values, &weights, level).unwrap();
            assert!((1.0..=5.0).contains(&q));
        }
    }

    #[test]
    fn test_uniform_weight_equivalence() {
        // With equal weights the engine is the interpolated empirical
        // quantile: knots at i/n, straight lines in between.
        let values = vec![10.0, 20.0, 30.0, 40.0];
        let weights = vec![1.0; 4];
        assert_eq!(weighted_quantile(&values, &weights, 0.25).unwrap(), 10.0);
        assert_eq!(weighted_quantile(&values, &weights, 0.5).unwrap(), 20.0);
        assert_eq!(weighted_quantile(&values, &weights, 0.375).unwrap(), 15.0);
        assert_eq!(weighted_quantile(&values, &weights, 1.0).unwrap(), 40.0);
        assert_eq!(weighted_quantile(&values, &weights, 0.0).unwrap(), 10.0);
    }

    #[test]
    fn test_clamped_below_first_knot() {
        let values = vec![2.0, 8.0];
        let weights = vec![1.0, 1.0];
        assert_eq!(weighted_quantile(&values, &weights, 0.1).unwrap(), 2.0);
    }

    #[test]
    fn test_ties_are_deterministic() {
        let values = vec![3.0, 3.0, 3.0, 7.0];
        let weights = vec![1.0, 2.0, 1.0, 4.0];
        let a = weighted_quantile(&values, &weights, 0.6).unwrap();
        let b = weighted_quantile(&values, &weights, 0.6).unwrap();
        assert_eq!(a, b);
        assert!((3.0..=7.0).contains(&a));
    }

    #[test]
    fn test_length_mismatch() {
        let err = weighted_quantile(&[1.0, 2.0], &[1.0], 0.5).unwrap_err();
        assert!(matches!(err, ConfluenceError::Dimension(_, 2, 1)));
    }

    #[test]
    fn test_invalid_weights() {
        let err = weighted_quantile(&[1.0, 2.0], &[1.0, -1.0], 0.5).unwrap_err();
        assert!(matches!(err, ConfluenceError::InvalidWeight(1, _)));
        let err = weighted_quantile(&[1.0, 2.0], &[1.0, 0.0], 0.5).unwrap_err();
        assert!(matches!(err, ConfluenceError::InvalidWeight(1, _)));
        let err = weighted_quantile(&[1.0, 2.0], &[f64::NAN, 1.0], 0.5).unwrap_err();
        assert!(matches!(err, ConfluenceError::InvalidWeight(0, _)));
        let err = weighted_quantile(&[1.0, 2.0], &[f64::INFINITY, 1.0], 0.5).unwrap_err();
        assert!(matches!(err, ConfluenceError::InvalidWeight(0, _)));
    }

    #[test]
    fn test_invalid_level() {
        assert!(weighted_quantile(&[1.0], &[1.0], 1.5).is_err());
        assert!(weighted_quantile(&[1.0], &[1.0], -0.1).is_err());
        assert!(weighted_quantile(&[1.0], &[1.0], f64::NAN).is_err());
    }

    #[test]
    fn test_calibration_scores_matches_naive() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let n = rng.gen_range(1..40);
            let scores: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..10.0)).collect();
            let weights: Vec<f64> = (0..n).map(|_| rng.gen_range(0.1..5.0)).collect();
            let test_weight = rng.gen_range(0.1..5.0);
            let level = rng.gen_range(0.0..1.0);

            let presorted = CalibrationScores::new(&scores, &weights).unwrap();
            let fast = presorted.quantile_with_test_weight(test_weight, level).unwrap();

            let mut augmented_scores = scores.clone();
            augmented_scores.push(f64::INFINITY);
            let mut augmented_weights = weights.clone();
            augmented_weights.push(test_weight);
            let naive = weighted_quantile(&augmented_scores, &augmented_weights, level).unwrap();

            assert_eq!(fast, naive);
        }
    }

    #[test]
    fn test_calibration_scores_empty_is_all_sentinel() {
        let presorted = CalibrationScores::new(&[], &[]).unwrap();
        assert_eq!(presorted.len(), 1);
        let q = presorted.quantile_with_test_weight(2.0, 0.5).unwrap();
        assert!(q.is_infinite());
    }

    #[test]
    fn test_calibration_scores_rejects_bad_test_weight() {
        let presorted = CalibrationScores::new(&[1.0, 2.0], &[1.0, 1.0]).unwrap();
        assert!(presorted.quantile_with_test_weight(0.0, 0.5).is_err());
        assert!(presorted.quantile_with_test_weight(f64::NAN, 0.5).is_err());
    }

    #[test]
    fn test_sentinel_dominance_with_growing_weight() {
        // As the sentinel's weight share grows the quantile climbs toward
        // infinity.
        let presorted = CalibrationScores::new(&[1.0, 2.0, 3.0, 4.0], &[1.0; 4]).unwrap();
        let mut last = 0.0;
        for w in [0.5, 1.0, 4.0, 16.0] {
            let q = presorted.quantile_with_test_weight(w, 0.7).unwrap();
            assert!(q >= last);
            last = q;
        }
        assert!(last.is_infinite());
    }
}
