//! Continuous tuning over a sliding window of recent evaluations.
//!
//! [`OnlineOptimizer`] never finishes. Callers report `(weights, score)`
//! pairs as they arrive, consult [`OnlineOptimizer::should_update`] to decide
//! when to ask for new weights, and read back the best weights in the window.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

use wt_types::{Evaluation, SignalBound, WeightVector, WtError, WtResult};

use crate::batch::{BatchConfig, BatchOptimizer};
use crate::report::{best_index, WindowStatistics};
use crate::search::SearchSpace;

/// Below this many windowed evaluations the status quo is kept.
pub const MIN_POINTS_FOR_EXPLOITATION: usize = 5;

/// Configuration for an online optimizer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineConfig {
    /// Most recent evaluations kept for fitting.
    pub window_size: usize,
    /// `should_update` fires every this many evaluations.
    pub update_interval: usize,
    /// Probability of a pure random suggestion.
    pub exploration_rate: f64,
    pub batch: BatchConfig,
}

impl Default for OnlineConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            update_interval: 10,
            exploration_rate: 0.1,
            batch: BatchConfig::default(),
        }
    }
}

impl OnlineConfig {
    pub fn with_window(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_update_interval(mut self, update_interval: usize) -> Self {
        self.update_interval = update_interval;
        self
    }

    pub fn with_exploration_rate(mut self, rate: f64) -> Self {
        self.exploration_rate = rate;
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn validate(&self) -> WtResult<()> {
        if self.window_size == 0 {
            return Err(WtError::Config("window_size must be at least 1".into()));
        }
        if self.update_interval == 0 {
            return Err(WtError::Config("update_interval must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.exploration_rate) {
            return Err(WtError::Config(format!(
                "exploration_rate must lie in [0, 1], got {}",
                self.exploration_rate
            )));
        }
        self.batch.validate()
    }
}

// ---------------------------------------------------------------------------
// Sliding window
// ---------------------------------------------------------------------------

/// FIFO buffer holding at most `capacity` evaluations.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationWindow {
    entries: VecDeque<Evaluation>,
    capacity: usize,
}

impl EvaluationWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Append at the end; returns the evicted oldest entry when full.
    pub fn push(&mut self, evaluation: Evaluation) -> Option<Evaluation> {
        self.entries.push_back(evaluation);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Evaluation> {
        self.entries.iter()
    }

    pub fn scores(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.score).collect()
    }

    pub fn to_vec(&self) -> Vec<Evaluation> {
        self.entries.iter().cloned().collect()
    }

    /// Highest score; the oldest entry wins a tie.
    pub fn best(&self) -> Option<&Evaluation> {
        best_index(&self.scores()).and_then(|i| self.entries.get(i))
    }
}

// ---------------------------------------------------------------------------
// Online optimizer
// ---------------------------------------------------------------------------

/// Serializable state of an online session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineSnapshot {
    pub bounds: Vec<SignalBound>,
    pub config: OnlineConfig,
    pub window: Vec<Evaluation>,
    pub evaluation_count: u64,
    pub current_weights: WeightVector,
}

/// Long-running optimizer with a sliding evaluation window.
pub struct OnlineOptimizer {
    optimizer: BatchOptimizer,
    config: OnlineConfig,
    window: EvaluationWindow,
    evaluation_count: u64,
    current_weights: WeightVector,
}

impl OnlineOptimizer {
    pub fn new(bounds: Vec<SignalBound>, config: OnlineConfig) -> WtResult<Self> {
        config.validate()?;
        let optimizer = BatchOptimizer::new(bounds, config.batch.clone())?;
        let current_weights = optimizer.space().initial_weights();
        Ok(Self {
            optimizer,
            window: EvaluationWindow::new(config.window_size),
            config,
            evaluation_count: 0,
            current_weights,
        })
    }

    pub fn space(&self) -> &SearchSpace {
        self.optimizer.space()
    }

    pub fn config(&self) -> &OnlineConfig {
        &self.config
    }

    pub fn window(&self) -> &EvaluationWindow {
        &self.window
    }

    pub fn evaluation_count(&self) -> u64 {
        self.evaluation_count
    }

    pub fn current_weights(&self) -> &WeightVector {
        &self.current_weights
    }

    /// Append an evaluation, evicting the oldest one past `window_size`.
    ///
    /// Weights must name exactly this session's signals and, like the score,
    /// be finite; a rejected evaluation leaves the session untouched.
    pub fn record_evaluation(&mut self, weights: WeightVector, score: f64) -> WtResult<()> {
        self.space().check_weights(&weights)?;
        let evaluation = Evaluation::new(weights, score);
        evaluation.ensure_finite()?;

        if self.window.push(evaluation).is_some() {
            debug!(window = self.window.len(), "evicted oldest evaluation");
        }
        self.evaluation_count += 1;
        Ok(())
    }

    /// True exactly when the evaluation count is a positive multiple of
    /// `update_interval`.
    pub fn should_update(&self) -> bool {
        self.evaluation_count > 0
            && self.evaluation_count % self.config.update_interval as u64 == 0
    }

    /// Next weights to deploy.
    ///
    /// Explores with probability `exploration_rate`; keeps the current
    /// weights while the window is too small; otherwise asks the surrogate.
    pub fn get_next_weights(&mut self) -> WtResult<WeightVector> {
        let roll: f64 = self.optimizer.rng_mut().random();
        if roll < self.config.exploration_rate {
            debug!(roll, "exploring with a random point");
            return self.first_suggestion(&[]);
        }

        if self.window.len() < MIN_POINTS_FOR_EXPLOITATION {
            return Ok(self.current_weights.clone());
        }

        let history = self.window.to_vec();
        self.first_suggestion(&history)
    }

    /// `n` independent calls to [`get_next_weights`](Self::get_next_weights).
    pub fn suggest(&mut self, n: usize) -> WtResult<Vec<WeightVector>> {
        (0..n).map(|_| self.get_next_weights()).collect()
    }

    /// Weights of the best evaluation in the window, or the current weights
    /// when the window is empty.
    pub fn get_best_weights(&self) -> WeightVector {
        self.window
            .best()
            .map(|e| e.weights.clone())
            .unwrap_or_else(|| self.current_weights.clone())
    }

    pub fn best_evaluation(&self) -> Option<&Evaluation> {
        self.window.best()
    }

    pub fn get_statistics(&self) -> WindowStatistics {
        WindowStatistics::from_scores(&self.window.scores())
    }

    pub fn get_feature_importance(&mut self) -> WtResult<HashMap<String, f64>> {
        let history = self.window.to_vec();
        self.optimizer.get_feature_importance(&history)
    }

    /// Adopt `weights` as the status quo.
    pub fn accept_weights(&mut self, weights: WeightVector) -> WtResult<()> {
        self.space().check_weights(&weights)?;
        info!(evaluations = self.evaluation_count, "accepted new current weights");
        self.current_weights = weights;
        Ok(())
    }

    pub fn snapshot(&self) -> OnlineSnapshot {
        OnlineSnapshot {
            bounds: self.space().bounds().to_vec(),
            config: self.config.clone(),
            window: self.window.to_vec(),
            evaluation_count: self.evaluation_count,
            current_weights: self.current_weights.clone(),
        }
    }

    /// Rebuild a session from a snapshot.
    ///
    /// A seeded session continues from `seed + evaluation_count`, so the
    /// restored stream does not replay the original one.
    pub fn restore(snapshot: OnlineSnapshot) -> WtResult<Self> {
        if snapshot.evaluation_count < snapshot.window.len() as u64 {
            return Err(WtError::Validation(format!(
                "snapshot records {} evaluations but its window holds {}",
                snapshot.evaluation_count,
                snapshot.window.len()
            )));
        }
        let mut config = snapshot.config;
        config.batch.seed = config
            .batch
            .seed
            .map(|s| s.wrapping_add(snapshot.evaluation_count));

        let mut restored = Self::new(snapshot.bounds, config)?;
        restored.space().check_weights(&snapshot.current_weights)?;
        for evaluation in snapshot.window {
            restored.space().check_weights(&evaluation.weights)?;
            evaluation.ensure_finite()?;
            restored.window.push(evaluation);
        }
        restored.evaluation_count = snapshot.evaluation_count;
        restored.current_weights = snapshot.current_weights;
        Ok(restored)
    }

    fn first_suggestion(&mut self, history: &[Evaluation]) -> WtResult<WeightVector> {
        self.optimizer
            .suggest_next(history, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| WtError::Internal("optimizer returned no suggestion".into()))
    }
}
