//! Search space definition and simplex normalization.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use wt_types::{SignalBound, WeightVector, WtError, WtResult};

/// Ordered signal dimensions of one optimizer session.
///
/// Declaration order fixes the mapping between dense arrays and named
/// [`WeightVector`]s for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    bounds: Vec<SignalBound>,
    /// Rescale every point onto the unit simplex before it is used.
    simplex: bool,
}

impl SearchSpace {
    /// Validate the bounds and build a space with the simplex constraint on.
    pub fn new(bounds: Vec<SignalBound>) -> WtResult<Self> {
        if bounds.is_empty() {
            return Err(WtError::Config("at least one signal bound is required".into()));
        }
        let mut seen = HashSet::new();
        for bound in &bounds {
            bound.validate()?;
            if !seen.insert(bound.signal_id.as_str()) {
                return Err(WtError::Config(format!(
                    "duplicate signal_id: {}",
                    bound.signal_id
                )));
            }
        }
        Ok(Self {
            bounds,
            simplex: true,
        })
    }

    pub fn with_simplex(mut self, simplex: bool) -> Self {
        self.simplex = simplex;
        self
    }

    pub fn is_simplex(&self) -> bool {
        self.simplex
    }

    pub fn dimensions(&self) -> usize {
        self.bounds.len()
    }

    pub fn bounds(&self) -> &[SignalBound] {
        &self.bounds
    }

    pub fn signal_ids(&self) -> impl Iterator<Item = &str> {
        self.bounds.iter().map(|b| b.signal_id.as_str())
    }

    /// Uniform draw inside every `[min_weight, max_weight]`.
    pub fn sample_raw<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.bounds
            .iter()
            .map(|b| rng.random_range(b.min_weight..=b.max_weight))
            .collect()
    }

    /// Apply the session's normalization policy to a dense point.
    pub fn normalize(&self, raw: &[f64]) -> Vec<f64> {
        if self.simplex {
            simplex_normalize(raw)
        } else {
            raw.to_vec()
        }
    }

    /// Normalize a dense point and name its components.
    pub fn to_weights(&self, raw: &[f64]) -> WeightVector {
        self.signal_ids()
            .zip(self.normalize(raw))
            .map(|(id, w)| (id.to_string(), w))
            .collect()
    }

    /// Dense view of a weight vector in declaration order.
    pub fn to_dense(&self, weights: &WeightVector) -> WtResult<Vec<f64>> {
        self.check_weights(weights)?;
        self.signal_ids()
            .map(|id| {
                weights
                    .get(id)
                    .ok_or_else(|| WtError::Validation(format!("missing weight for {id}")))
            })
            .collect()
    }

    /// The exact signal set with finite values, nothing more or less.
    pub fn check_weights(&self, weights: &WeightVector) -> WtResult<()> {
        if weights.len() != self.dimensions() {
            return Err(WtError::Validation(format!(
                "expected {} weights, got {}",
                self.dimensions(),
                weights.len()
            )));
        }
        for id in self.signal_ids() {
            match weights.get(id) {
                None => return Err(WtError::Validation(format!("missing weight for {id}"))),
                Some(w) if !w.is_finite() => {
                    return Err(WtError::Validation(format!(
                        "weight for {id} must be finite, got {w}"
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Declared initial weights, unnormalized.
    pub fn initial_weights(&self) -> WeightVector {
        self.bounds
            .iter()
            .map(|b| (b.signal_id.clone(), b.initial_weight))
            .collect()
    }
}

/// Divide by the sum when positive; otherwise fall back to `1/n` everywhere.
///
/// Components are first scaled by the largest magnitude so the sum cannot
/// overflow.
pub fn simplex_normalize(raw: &[f64]) -> Vec<f64> {
    let uniform = || vec![1.0 / raw.len() as f64; raw.len()];
    let peak = raw.iter().fold(0.0_f64, |acc, w| acc.max(w.abs()));
    if !peak.is_finite() || peak == 0.0 {
        return uniform();
    }
    let scaled: Vec<f64> = raw.iter().map(|w| w / peak).collect();
    let total: f64 = scaled.iter().sum();
    if total > 0.0 {
        scaled.iter().map(|w| w / total).collect()
    } else {
        uniform()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_space() -> SearchSpace {
        SearchSpace::new(vec![
            SignalBound::new("momentum", 0.0, 1.0, 0.4),
            SignalBound::new("whale_flow", 0.1, 0.9, 0.3),
            SignalBound::new("news", 0.0, 2.0, 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_empty_and_duplicate_bounds() {
        assert!(matches!(SearchSpace::new(vec![]), Err(WtError::Config(_))));
        let dup = SearchSpace::new(vec![SignalBound::unit("a"), SignalBound::unit("a")]);
        assert!(matches!(dup, Err(WtError::Config(_))));
    }

    #[test]
    fn rejects_invalid_bound() {
        let bad = SearchSpace::new(vec![
            SignalBound::unit("a"),
            SignalBound::new("b", 0.0, 1.0, 3.0),
        ]);
        assert!(bad.is_err());
    }

    #[test]
    fn simplex_normalization_sums_to_one() {
        let space = sample_space();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let raw = space.sample_raw(&mut rng);
            let total: f64 = space.normalize(&raw).iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn degenerate_sum_falls_back_to_uniform() {
        assert_eq!(simplex_normalize(&[0.0, 0.0, 0.0, 0.0]), vec![0.25; 4]);
        assert_eq!(simplex_normalize(&[-1.0, 0.5]), vec![0.5, 0.5]);
        // Positive sums are never replaced by the uniform vector.
        let scaled = simplex_normalize(&[1.0, 3.0]);
        assert!((scaled[0] - 0.25).abs() < 1e-12);
        assert!((scaled[1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn normalization_survives_sum_overflow() {
        let normalized = simplex_normalize(&[1.6e308, 1.6e308]);
        assert_eq!(normalized, vec![0.5, 0.5]);

        let mixed = simplex_normalize(&[f64::MAX, f64::MAX / 2.0, 0.0]);
        let total: f64 = mixed.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((mixed[0] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn wide_bounds_sample_without_overflow() {
        let space = SearchSpace::new(vec![
            SignalBound::new("a", -1e307, 1e307, 0.0),
            SignalBound::new("b", 0.0, 1e307, 1.0),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..20 {
            let raw = space.sample_raw(&mut rng);
            assert!(raw.iter().all(|v| v.is_finite()));
            let total: f64 = space.normalize(&raw).iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
        let huge = SearchSpace::new(vec![SignalBound::new("c", -1e308, 1e308, 0.0)]);
        assert!(matches!(huge, Err(WtError::Config(_))));
    }

    #[test]
    fn identity_when_simplex_disabled() {
        let space = sample_space().with_simplex(false);
        let raw = vec![0.2, 0.3, 1.5];
        assert_eq!(space.normalize(&raw), raw);
        assert!(!space.is_simplex());
    }

    #[test]
    fn samples_respect_bounds() {
        let space = sample_space();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            let raw = space.sample_raw(&mut rng);
            for (v, b) in raw.iter().zip(space.bounds()) {
                assert!(b.contains(*v), "{v} outside {b:?}");
            }
        }
    }

    #[test]
    fn dense_round_trip_preserves_order() {
        let space = sample_space().with_simplex(false);
        let weights = space.to_weights(&[0.1, 0.2, 0.3]);
        assert_eq!(weights.get("whale_flow"), Some(0.2));
        assert_eq!(space.to_dense(&weights).unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn dense_conversion_rejects_foreign_keys() {
        let space = sample_space();
        let weights = WeightVector::new()
            .with("momentum", 0.1)
            .with("whale_flow", 0.2)
            .with("sentiment", 0.3);
        assert!(matches!(space.to_dense(&weights), Err(WtError::Validation(_))));
    }

    #[test]
    fn initial_weights_are_declared_values() {
        let initial = sample_space().initial_weights();
        assert_eq!(initial.get("momentum"), Some(0.4));
        assert_eq!(initial.get("news"), Some(1.0));
    }
}
