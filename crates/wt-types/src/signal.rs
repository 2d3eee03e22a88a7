//! Signal bounds, weight vectors, and recorded evaluations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::{WtError, WtResult};

/// Opaque identifier of an optimizer session.
pub type SessionId = Uuid;

/// Opaque identifier of a background batch job.
pub type JobId = Uuid;

/// Weight interval and starting value for a single trading signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalBound {
    pub signal_id: String,
    #[serde(default)]
    pub min_weight: f64,
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
    #[serde(default = "default_initial_weight")]
    pub initial_weight: f64,
}

fn default_max_weight() -> f64 {
    1.0
}

fn default_initial_weight() -> f64 {
    0.5
}

impl SignalBound {
    pub fn new(
        signal_id: impl Into<String>,
        min_weight: f64,
        max_weight: f64,
        initial_weight: f64,
    ) -> Self {
        Self {
            signal_id: signal_id.into(),
            min_weight,
            max_weight,
            initial_weight,
        }
    }

    /// Unit interval with the initial weight at its midpoint.
    pub fn unit(signal_id: impl Into<String>) -> Self {
        Self::new(signal_id, 0.0, default_max_weight(), default_initial_weight())
    }

    pub fn with_initial(mut self, initial_weight: f64) -> Self {
        self.initial_weight = initial_weight;
        self
    }

    pub fn width(&self) -> f64 {
        self.max_weight - self.min_weight
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min_weight && value <= self.max_weight
    }

    /// Check the interval on its own; uniqueness across a set is checked by
    /// the search space.
    pub fn validate(&self) -> WtResult<()> {
        if self.signal_id.trim().is_empty() {
            return Err(WtError::Config("signal_id must not be empty".into()));
        }
        let finite = [self.min_weight, self.max_weight, self.initial_weight]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(WtError::Config(format!(
                "signal {}: bounds must be finite",
                self.signal_id
            )));
        }
        if self.min_weight >= self.max_weight {
            return Err(WtError::Config(format!(
                "signal {}: min_weight {} must be below max_weight {}",
                self.signal_id, self.min_weight, self.max_weight
            )));
        }
        if !self.width().is_finite() {
            return Err(WtError::Config(format!(
                "signal {}: interval [{}, {}] is too wide to sample",
                self.signal_id, self.min_weight, self.max_weight
            )));
        }
        if !self.contains(self.initial_weight) {
            return Err(WtError::Config(format!(
                "signal {}: initial_weight {} outside [{}, {}]",
                self.signal_id, self.initial_weight, self.min_weight, self.max_weight
            )));
        }
        Ok(())
    }
}

/// Named weights, one per signal of the owning session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector {
    weights: HashMap<String, f64>,
}

impl WeightVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, signal_id: &str) -> Option<f64> {
        self.weights.get(signal_id).copied()
    }

    pub fn insert(&mut self, signal_id: impl Into<String>, weight: f64) {
        self.weights.insert(signal_id.into(), weight);
    }

    pub fn with(mut self, signal_id: impl Into<String>, weight: f64) -> Self {
        self.insert(signal_id, weight);
        self
    }

    pub fn contains(&self, signal_id: &str) -> bool {
        self.weights.contains_key(signal_id)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn is_finite(&self) -> bool {
        self.weights.values().all(|v| v.is_finite())
    }
}

impl FromIterator<(String, f64)> for WeightVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            weights: iter.into_iter().collect(),
        }
    }
}

impl From<HashMap<String, f64>> for WeightVector {
    fn from(weights: HashMap<String, f64>) -> Self {
        Self { weights }
    }
}

/// One observed (weights, score) pair. Higher scores are better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub weights: WeightVector,
    pub score: f64,
}

impl Evaluation {
    pub fn new(weights: WeightVector, score: f64) -> Self {
        Self { weights, score }
    }

    /// Reject NaN / infinite values before they can reach a surrogate.
    pub fn ensure_finite(&self) -> WtResult<()> {
        if !self.score.is_finite() {
            return Err(WtError::Validation(format!(
                "score must be finite, got {}",
                self.score
            )));
        }
        if let Some((id, w)) = self.weights.iter().find(|(_, w)| !w.is_finite()) {
            return Err(WtError::Validation(format!(
                "weight for {id} must be finite, got {w}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_validation_rejects_inverted_interval() {
        let bound = SignalBound::new("momentum", 1.0, 0.5, 0.75);
        let err = bound.validate().unwrap_err();
        assert!(matches!(err, WtError::Config(_)));
        assert!(err.to_string().contains("momentum"));
    }

    #[test]
    fn bound_validation_rejects_equal_min_max() {
        assert!(SignalBound::new("flat", 0.5, 0.5, 0.5).validate().is_err());
    }

    #[test]
    fn bound_validation_rejects_initial_outside() {
        let bound = SignalBound::new("news", 0.0, 1.0, 1.5);
        assert!(bound.validate().is_err());
    }

    #[test]
    fn bound_validation_rejects_nan() {
        let bound = SignalBound::new("nan", f64::NAN, 1.0, 0.5);
        assert!(bound.validate().is_err());
    }

    #[test]
    fn bound_validation_rejects_overflowing_width() {
        let bound = SignalBound::new("huge", -1e308, 1e308, 0.0);
        let err = bound.validate().unwrap_err();
        assert!(matches!(err, WtError::Config(_)));
        assert!(SignalBound::new("wide", -1e307, 1e307, 0.0).validate().is_ok());
    }

    #[test]
    fn unit_bound_is_valid() {
        let bound = SignalBound::unit("orderflow");
        assert!(bound.validate().is_ok());
        assert_eq!(bound.initial_weight, 0.5);
        assert_eq!(bound.width(), 1.0);
    }

    #[test]
    fn bound_deserializes_with_defaults() {
        let bound: SignalBound = serde_json::from_str(r#"{"signal_id":"whale"}"#).unwrap();
        assert_eq!(bound, SignalBound::unit("whale"));
    }

    #[test]
    fn weight_vector_serializes_as_plain_map() {
        let weights = WeightVector::new().with("a", 0.25);
        let json = serde_json::to_string(&weights).unwrap();
        assert_eq!(json, r#"{"a":0.25}"#);
    }

    #[test]
    fn evaluation_rejects_non_finite_values() {
        let weights = WeightVector::new().with("a", 0.5);
        assert!(Evaluation::new(weights.clone(), f64::NAN).ensure_finite().is_err());
        assert!(Evaluation::new(weights.clone(), 1.0).ensure_finite().is_ok());

        let bad = WeightVector::new().with("a", f64::INFINITY);
        assert!(Evaluation::new(bad, 1.0).ensure_finite().is_err());
    }
}
