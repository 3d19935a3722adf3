//! Sampler
//!
//! Glue for carving the probability sample into calibration and held-out
//! test subsets, and for constructing design weights from inclusion
//! probabilities. The RNG is always owned and seeded by the caller, the
//! calibration engine itself never touches ambient random state.
use crate::errors::ConfluenceError;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

// A sampler splits row indices into a calibration subset and the
// remainder.
pub trait Sampler {
    /// Sample the data, returning a tuple, where the first item is the rows
    /// chosen for calibration, and the second are the rows excluded.
    fn sample(&mut self, rng: &mut StdRng, index: &[usize]) -> (Vec<usize>, Vec<usize>);
}

/// Select each row independently with a fixed probability.
#[derive(Serialize, Deserialize)]
pub struct FractionSampler {
    fraction: f32,
}

impl FractionSampler {
    /// Create a new FractionSampler.
    ///
    /// * `fraction` - Probability that any given row lands in the
    ///   calibration subset.
    pub fn new(fraction: f32) -> Self {
        FractionSampler { fraction }
    }
}

impl Sampler for FractionSampler {
    fn sample(&mut self, rng: &mut StdRng, index: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let fraction = self.fraction;
        let mut chosen = Vec::new();
        let mut excluded = Vec::new();
        for i in index {
            if rng.gen::<f32>() < fraction {
                chosen.push(*i);
            } else {
                excluded.push(*i)
            }
        }
        (chosen, excluded)
    }
}

/// Design weights `1 / pi` from inclusion probabilities.
///
/// * `pi` - Inclusion probabilities, each in (0, 1].
pub fn inclusion_weights(pi: &[f64]) -> Result<Vec<f64>, ConfluenceError> {
    let mut weights = Vec::with_capacity(pi.len());
    for (i, &p) in pi.iter().enumerate() {
        if !(p.is_finite() && p > 0.0 && p <= 1.0) {
            return Err(ConfluenceError::InvalidParameter(
                "inclusion probability".to_string(),
                "a value in (0, 1]".to_string(),
                format!("{} at row {}", p, i),
            ));
        }
        weights.push(1.0 / p);
    }
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_fraction_sampler() {
        let mut rng = StdRng::seed_from_u64(42);
        let index = vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut sampler = FractionSampler::new(0.5);
        let (chosen, excluded) = sampler.sample(&mut rng, &index);

        // With seed 42 and 0.5 fraction, we should get some split.
        assert!(!chosen.is_empty());
        assert!(!excluded.is_empty());
        assert_eq!(chosen.len() + excluded.len(), index.len());

        // Test with fraction 1.0 (all should be chosen)
        let mut sampler_all = FractionSampler::new(1.0);
        let (chosen_all, excluded_all) = sampler_all.sample(&mut rng, &index);
        assert_eq!(chosen_all.len(), index.len());
        assert!(excluded_all.is_empty());

        // Test with fraction 0.0 (none should be chosen)
        let mut sampler_none = FractionSampler::new(0.0);
        let (chosen_none, excluded_none) = sampler_none.sample(&mut rng, &index);
        assert!(chosen_none.is_empty());
        assert_eq!(excluded_none.len(), index.len());
    }

    #[test]
    fn test_fraction_sampler_is_seed_deterministic() {
        let index: Vec<usize> = (0..100).collect();
        let mut a = FractionSampler::new(0.3);
        let mut b = FractionSampler::new(0.3);
        let (chosen_a, _) = a.sample(&mut StdRng::seed_from_u64(7), &index);
        let (chosen_b, _) = b.sample(&mut StdRng::seed_from_u64(7), &index);
        assert_eq!(chosen_a, chosen_b);
    }

    #[test]
    fn test_inclusion_weights() {
        let weights = inclusion_weights(&[0.5, 0.25, 1.0]).unwrap();
        assert_eq!(weights, vec![2.0, 4.0, 1.0]);
    }

    #[test]
    fn test_inclusion_weights_rejects_bad_probabilities() {
        assert!(inclusion_weights(&[0.5, 0.0]).is_err());
        assert!(inclusion_weights(&[1.5]).is_err());
        assert!(inclusion_weights(&[-0.1]).is_err());
        assert!(inclusion_weights(&[f64::NAN]).is_err());
    }
}
