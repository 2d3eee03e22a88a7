//! Fixed-budget Bayesian optimization over signal weights.
//!
//! The run starts with `n_initial_points` uniform draws, then alternates
//! surrogate fitting and Expected Improvement picks until `n_calls`
//! evaluations have been spent. Every point is normalized before the
//! objective sees it.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use tracing::{debug, info, warn};

use wt_types::{Evaluation, SignalBound, WeightVector, WtError, WtResult};

use crate::acquisition::{select_candidate, DEFAULT_N_CANDIDATES};
use crate::report::{importance_from_length_scales, uniform_importance};
use crate::run::{BatchRun, OptimizationResult};
use crate::search::SearchSpace;
use crate::surrogate::{GaussianProcess, KernelKind, SurrogateConfig, SurrogateModel};

/// Below this many evaluated points `suggest_next` samples uniformly.
pub const MIN_POINTS_FOR_MODEL: usize = 3;

/// Below this many evaluated points importances are uniform.
pub const MIN_POINTS_FOR_IMPORTANCE: usize = 5;

/// Configuration for a batch optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Total objective evaluations per run.
    pub n_calls: usize,
    /// Uniform draws before the surrogate takes over.
    pub n_initial_points: usize,
    /// Candidate pool size for each acquisition pick.
    pub n_candidates: usize,
    /// Enforce the simplex constraint (weights sum to 1).
    pub normalize: bool,
    /// `None` seeds from OS entropy.
    pub seed: Option<u64>,
    pub surrogate: SurrogateConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            n_calls: 50,
            n_initial_points: 10,
            n_candidates: DEFAULT_N_CANDIDATES,
            normalize: true,
            seed: Some(42),
            surrogate: SurrogateConfig::default(),
        }
    }
}

impl BatchConfig {
    pub fn with_calls(mut self, n_calls: usize, n_initial_points: usize) -> Self {
        self.n_calls = n_calls;
        self.n_initial_points = n_initial_points;
        self
    }

    pub fn with_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_surrogate(mut self, surrogate: SurrogateConfig) -> Self {
        self.surrogate = surrogate;
        self
    }

    pub fn validate(&self) -> WtResult<()> {
        if self.n_calls == 0 {
            return Err(WtError::Config("n_calls must be at least 1".into()));
        }
        if self.n_initial_points == 0 {
            return Err(WtError::Config("n_initial_points must be at least 1".into()));
        }
        if self.n_candidates == 0 {
            return Err(WtError::Config("n_candidates must be at least 1".into()));
        }
        self.surrogate.validate()
    }
}

/// Where a batch run is in its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    Initializing,
    Warmup,
    ModelGuided,
    Done,
}

impl BatchPhase {
    /// Phase that serves the next request after `completed` evaluations.
    pub fn after(completed: usize, config: &BatchConfig) -> Self {
        if completed >= config.n_calls {
            Self::Done
        } else if completed < config.n_initial_points {
            Self::Warmup
        } else {
            Self::ModelGuided
        }
    }
}

/// Surrogate-driven optimizer for one set of signal bounds.
pub struct BatchOptimizer {
    space: SearchSpace,
    config: BatchConfig,
    rng: StdRng,
}

impl BatchOptimizer {
    pub fn new(bounds: Vec<SignalBound>, config: BatchConfig) -> WtResult<Self> {
        config.validate()?;
        let space = SearchSpace::new(bounds)?.with_simplex(config.normalize);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self { space, config, rng })
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub(crate) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Run the full budget against `objective`, which must return a score
    /// to maximize.
    ///
    /// An objective error or a non-finite score ends the run as
    /// [`Failed`](crate::OptimizationState::Failed) with the evaluations so
    /// far preserved.
    pub fn optimize<F, E>(&mut self, mut objective: F) -> BatchRun
    where
        F: FnMut(&WeightVector) -> Result<f64, E>,
        E: Display,
    {
        let mut run = BatchRun::new();
        run.mark_running();

        let mut points: Vec<Vec<f64>> = Vec::with_capacity(self.config.n_calls);
        let mut all_weights: Vec<WeightVector> = Vec::with_capacity(self.config.n_calls);
        let mut all_scores: Vec<f64> = Vec::with_capacity(self.config.n_calls);
        let mut phase = BatchPhase::Initializing;

        info!(
            signals = self.space.dimensions(),
            n_calls = self.config.n_calls,
            n_initial_points = self.config.n_initial_points,
            surrogate = ?self.config.surrogate,
            "batch optimization started"
        );

        loop {
            let next = BatchPhase::after(all_scores.len(), &self.config);
            if next != phase {
                info!(
                    from = ?phase,
                    to = ?next,
                    evaluations = all_scores.len(),
                    "batch phase transition"
                );
                phase = next;
            }

            let raw = match phase {
                BatchPhase::Done => break,
                BatchPhase::Initializing | BatchPhase::Warmup => {
                    self.space.sample_raw(&mut self.rng)
                }
                BatchPhase::ModelGuided => match self.propose(&points, &all_scores) {
                    Ok(point) => point,
                    Err(e) => {
                        warn!(error = %e, "surrogate step failed, stopping run");
                        let partial = OptimizationResult::from_history(all_weights, all_scores);
                        run.mark_failed(e.to_string(), partial);
                        return run;
                    }
                },
            };

            let weights = self.space.to_weights(&raw);
            let score = match objective(&weights) {
                Ok(score) if score.is_finite() => score,
                Ok(score) => {
                    let reason = format!("objective returned non-finite score {score}");
                    warn!(iteration = all_scores.len() + 1, %reason, "objective failed");
                    let partial = OptimizationResult::from_history(all_weights, all_scores);
                    run.mark_failed(reason, partial);
                    return run;
                }
                Err(e) => {
                    warn!(iteration = all_scores.len() + 1, error = %e, "objective failed");
                    let partial = OptimizationResult::from_history(all_weights, all_scores);
                    run.mark_failed(e.to_string(), partial);
                    return run;
                }
            };

            points.push(self.space.normalize(&raw));
            all_weights.push(weights);
            all_scores.push(score);

            let best = all_scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            debug!(iteration = all_scores.len(), score, best, "batch evaluation");
        }

        let result = OptimizationResult::from_history(all_weights, all_scores);
        if let Some(r) = &result {
            info!(
                best_score = r.best_score,
                iterations = r.n_iterations,
                "batch optimization completed"
            );
        }
        run.mark_completed(result);
        run
    }

    /// Like [`optimize`](Self::optimize), but points rejected by `constraint`
    /// score `penalty` without reaching the objective.
    ///
    /// Penalized points still spend budget and are fed to the surrogate as
    /// ordinary observations, which pushes the model away from the
    /// infeasible region.
    pub fn optimize_with_constraints<F, E>(
        &mut self,
        mut objective: F,
        constraint: Option<&dyn Fn(&WeightVector) -> bool>,
        penalty: f64,
    ) -> BatchRun
    where
        F: FnMut(&WeightVector) -> Result<f64, E>,
        E: Display,
    {
        if !penalty.is_finite() {
            let mut run = BatchRun::new();
            run.mark_failed(format!("penalty must be finite, got {penalty}"), None);
            return run;
        }
        self.optimize(|weights: &WeightVector| match constraint {
            Some(feasible) if !feasible(weights) => Ok(penalty),
            _ => objective(weights),
        })
    }

    /// Propose `n_suggestions` weight vectors given externally evaluated
    /// points.
    ///
    /// With fewer than three points the suggestions are uniform draws;
    /// otherwise a surrogate is fitted on all of them and each suggestion is
    /// the EI winner of a fresh candidate pool.
    pub fn suggest_next(
        &mut self,
        evaluated: &[Evaluation],
        n_suggestions: usize,
    ) -> WtResult<Vec<WeightVector>> {
        if evaluated.len() < MIN_POINTS_FOR_MODEL {
            debug!(points = evaluated.len(), "too few points for surrogate, sampling uniformly");
            return Ok((0..n_suggestions)
                .map(|_| {
                    let raw = self.space.sample_raw(&mut self.rng);
                    self.space.to_weights(&raw)
                })
                .collect());
        }

        let (points, scores) = self.training_data(evaluated)?;
        let mut model = self.config.surrogate.build(self.rng.random());
        model.fit(&points, &scores)?;
        let best_y = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let mut suggestions = Vec::with_capacity(n_suggestions);
        for _ in 0..n_suggestions {
            let pick = select_candidate(
                model.as_ref(),
                &self.space,
                best_y,
                self.config.n_candidates,
                &mut self.rng,
            )?;
            debug!(ei = pick.expected_improvement, model = model.name(), "acquisition pick");
            suggestions.push(self.space.to_weights(&pick.point));
        }
        Ok(suggestions)
    }

    /// Directional estimate of how strongly each signal drives the score.
    ///
    /// Fits an ARD squared-exponential process and reports normalized
    /// inverse length scales. Uniform below five points.
    pub fn get_feature_importance(
        &mut self,
        evaluated: &[Evaluation],
    ) -> WtResult<HashMap<String, f64>> {
        if evaluated.len() < MIN_POINTS_FOR_IMPORTANCE {
            return Ok(uniform_importance(self.space.signal_ids()));
        }

        let (points, scores) = self.training_data(evaluated)?;
        let mut gp = GaussianProcess::ard(
            KernelKind::SquaredExponential,
            self.config.surrogate.noise_variance(),
        );
        gp.fit(&points, &scores)?;
        Ok(importance_from_length_scales(
            self.space.signal_ids(),
            gp.length_scales(),
        ))
    }

    fn propose(&mut self, points: &[Vec<f64>], scores: &[f64]) -> WtResult<Vec<f64>> {
        let mut model = self.config.surrogate.build(self.rng.random());
        model.fit(points, scores)?;
        let best_y = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let pick = select_candidate(
            model.as_ref(),
            &self.space,
            best_y,
            self.config.n_candidates,
            &mut self.rng,
        )?;
        Ok(pick.point)
    }

    fn training_data(&self, evaluated: &[Evaluation]) -> WtResult<(Vec<Vec<f64>>, Vec<f64>)> {
        let mut points = Vec::with_capacity(evaluated.len());
        let mut scores = Vec::with_capacity(evaluated.len());
        for evaluation in evaluated {
            evaluation.ensure_finite()?;
            points.push(self.space.to_dense(&evaluation.weights)?);
            scores.push(evaluation.score);
        }
        Ok((points, scores))
    }
}
