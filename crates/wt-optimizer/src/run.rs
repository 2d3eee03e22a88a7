//! Batch run tracking and the result record it produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wt_types::{WeightVector, WtError, WtResult};

use crate::report::{best_index, convergence_history};

/// Lifecycle state for a batch run or background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Everything a finished (or partially finished) batch run observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub best_weights: WeightVector,
    pub best_score: f64,
    pub n_iterations: usize,
    /// Running maximum of `all_scores`.
    pub convergence_history: Vec<f64>,
    pub all_weights: Vec<WeightVector>,
    pub all_scores: Vec<f64>,
}

impl OptimizationResult {
    /// Derive best point and convergence curve; `None` when nothing was
    /// evaluated.
    pub fn from_history(all_weights: Vec<WeightVector>, all_scores: Vec<f64>) -> Option<Self> {
        let best = best_index(&all_scores)?;
        Some(Self {
            best_weights: all_weights[best].clone(),
            best_score: all_scores[best],
            n_iterations: all_scores.len(),
            convergence_history: convergence_history(&all_scores),
            all_weights,
            all_scores,
        })
    }
}

/// Outcome of one `optimize` call.
///
/// A failed run keeps whatever was evaluated before the failure in `result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRun {
    pub state: OptimizationState,
    pub result: Option<OptimizationResult>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchRun {
    pub fn new() -> Self {
        Self {
            state: OptimizationState::Pending,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = OptimizationState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, result: Option<OptimizationResult>) {
        self.state = OptimizationState::Completed;
        self.finished_at = Some(Utc::now());
        self.result = result;
    }

    pub fn mark_failed(&mut self, error: String, partial: Option<OptimizationResult>) {
        self.state = OptimizationState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
        self.result = partial;
    }

    pub fn is_completed(&self) -> bool {
        self.state == OptimizationState::Completed
    }

    /// Collapse into the result, surfacing a failure as an objective error.
    pub fn into_result(self) -> WtResult<OptimizationResult> {
        match self.state {
            OptimizationState::Completed => self
                .result
                .ok_or_else(|| WtError::Internal("completed run without evaluations".into())),
            OptimizationState::Failed => Err(WtError::Objective(
                self.error.unwrap_or_else(|| "unknown failure".into()),
            )),
            state => Err(WtError::Internal(format!("run still {state:?}"))),
        }
    }
}

impl Default for BatchRun {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(a: f64) -> WeightVector {
        WeightVector::new().with("a", a).with("b", 1.0 - a)
    }

    #[test]
    fn batch_run_lifecycle() {
        let mut run = BatchRun::new();
        assert_eq!(run.state, OptimizationState::Pending);
        assert!(run.started_at.is_none());

        run.mark_running();
        assert_eq!(run.state, OptimizationState::Running);
        assert!(run.started_at.is_some());

        let result = OptimizationResult::from_history(vec![weights(0.3)], vec![1.0]);
        run.mark_completed(result);
        assert!(run.is_completed());
        assert!(run.finished_at.is_some());
        assert_eq!(run.into_result().unwrap().best_score, 1.0);
    }

    #[test]
    fn failed_run_keeps_partial_results() {
        let mut run = BatchRun::new();
        run.mark_running();
        let partial = OptimizationResult::from_history(
            vec![weights(0.1), weights(0.2)],
            vec![0.5, 0.7],
        );
        run.mark_failed("backtest panicked".into(), partial);

        assert_eq!(run.state, OptimizationState::Failed);
        assert_eq!(run.error.as_deref(), Some("backtest panicked"));
        assert_eq!(run.result.as_ref().unwrap().n_iterations, 2);

        let err = run.into_result().unwrap_err();
        assert!(matches!(err, WtError::Objective(_)));
    }

    #[test]
    fn result_tracks_first_best() {
        let result = OptimizationResult::from_history(
            vec![weights(0.1), weights(0.2), weights(0.3), weights(0.4)],
            vec![1.0, 3.0, 2.0, 3.0],
        )
        .unwrap();

        assert_eq!(result.best_score, 3.0);
        assert_eq!(result.best_weights, weights(0.2));
        assert_eq!(result.convergence_history, vec![1.0, 3.0, 3.0, 3.0]);
        assert_eq!(result.n_iterations, 4);
    }

    #[test]
    fn empty_history_has_no_result() {
        assert!(OptimizationResult::from_history(vec![], vec![]).is_none());
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&OptimizationState::Completed).unwrap();
        assert_eq!(json, r#""completed""#);
    }
}
