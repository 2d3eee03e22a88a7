//! Caller-facing operations over the session registry.
//!
//! Every mutation of a session happens under that session's lock. Surrogate
//! work (suggestions, importances, batch jobs) runs on the fit pool; a
//! result that comes back after its session was deleted is dropped and the
//! caller sees `NotFound`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use wt_optimizer::{
    BatchConfig, BatchOptimizer, OnlineConfig, OnlineOptimizer, OnlineSnapshot, WindowStatistics,
};
use wt_types::{
    validation_error, Evaluation, JobId, SessionId, SignalBound, WeightVector, WtError, WtResult,
};

use crate::config::ServiceConfig;
use crate::jobs::{BatchJob, BatchJobOutput, JobTracker};
use crate::pool::FitWorkerPool;
use crate::registry::{not_found, SessionRegistry, SessionSlot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub session_id: SessionId,
    pub suggestions: Vec<WeightVector>,
    pub best_weights: WeightVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordResponse {
    pub accepted: bool,
    /// The caller should request new suggestions now.
    pub should_refit: bool,
    pub evaluation_count: u64,
    pub statistics: WindowStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestResponse {
    pub weights: WeightVector,
    /// `None` while the window is empty and `weights` are the initial ones.
    pub score: Option<f64>,
    pub statistics: WindowStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub signal_ids: Vec<String>,
    pub evaluation_count: u64,
    pub best_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub active_sessions: usize,
    pub batch_jobs: usize,
    pub worker_threads: usize,
}

/// Owns the session registry, the job table and the fit pool.
pub struct TuningService {
    config: ServiceConfig,
    registry: SessionRegistry,
    jobs: Arc<JobTracker>,
    pool: FitWorkerPool,
}

impl TuningService {
    pub fn new(config: ServiceConfig) -> WtResult<Self> {
        config.validate()?;
        let pool = FitWorkerPool::new(config.worker_threads)?;
        info!(
            workers = config.worker_threads,
            max_sessions = config.max_sessions,
            "tuning service started"
        );
        Ok(Self {
            registry: SessionRegistry::new(config.max_sessions),
            jobs: Arc::new(JobTracker::with_retention(config.max_finished_jobs)),
            pool,
            config,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Open an online session. Invalid bounds or config leave no trace.
    pub fn create(
        &self,
        bounds: Vec<SignalBound>,
        config: Option<OnlineConfig>,
    ) -> WtResult<SessionId> {
        let config = config.unwrap_or_else(|| self.config.default_online.clone());
        let optimizer = OnlineOptimizer::new(bounds, config)?;
        self.registry.insert(optimizer)
    }

    pub async fn suggest(&self, session_id: SessionId, n: usize) -> WtResult<SuggestResponse> {
        if n == 0 {
            return Err(validation_error!("at least one suggestion must be requested"));
        }
        let slot = self.registry.get(&session_id)?;
        let mut optimizer = slot.lock().await;
        slot.ensure_live()?;

        let outcome = self
            .pool
            .run(move || {
                let suggestions = optimizer.suggest(n)?;
                Ok::<_, WtError>((suggestions, optimizer.get_best_weights()))
            })
            .await?;
        let (suggestions, best_weights) = deliver(&slot, "suggest", outcome)?;

        debug!(session = %session_id, n, "suggestions produced");
        Ok(SuggestResponse {
            session_id,
            suggestions,
            best_weights,
        })
    }

    pub async fn record(
        &self,
        session_id: SessionId,
        weights: WeightVector,
        score: f64,
    ) -> WtResult<RecordResponse> {
        let slot = self.registry.get(&session_id)?;
        let mut optimizer = slot.lock().await;
        slot.ensure_live()?;

        optimizer.record_evaluation(weights, score)?;
        let response = RecordResponse {
            accepted: true,
            should_refit: optimizer.should_update(),
            evaluation_count: optimizer.evaluation_count(),
            statistics: optimizer.get_statistics(),
        };
        debug!(
            session = %session_id,
            score,
            count = response.evaluation_count,
            should_refit = response.should_refit,
            "evaluation recorded"
        );
        Ok(response)
    }

    pub async fn best(&self, session_id: SessionId) -> WtResult<BestResponse> {
        let slot = self.registry.get(&session_id)?;
        let optimizer = slot.lock().await;
        slot.ensure_live()?;

        Ok(BestResponse {
            weights: optimizer.get_best_weights(),
            score: optimizer.best_evaluation().map(|e| e.score),
            statistics: optimizer.get_statistics(),
        })
    }

    /// Remove the session. Work already running for it completes but its
    /// result is discarded.
    pub fn delete(&self, session_id: SessionId) -> WtResult<()> {
        self.registry.remove(&session_id).map(|_| ())
    }

    /// Adopt `weights` as the session's status quo.
    pub async fn accept(&self, session_id: SessionId, weights: WeightVector) -> WtResult<()> {
        let slot = self.registry.get(&session_id)?;
        let mut optimizer = slot.lock().await;
        slot.ensure_live()?;
        optimizer.accept_weights(weights)
    }

    /// Directional per-signal importance over the session window.
    pub async fn importance(&self, session_id: SessionId) -> WtResult<HashMap<String, f64>> {
        let slot = self.registry.get(&session_id)?;
        let mut optimizer = slot.lock().await;
        slot.ensure_live()?;

        let outcome = self
            .pool
            .run(move || optimizer.get_feature_importance())
            .await?;
        deliver(&slot, "importance", outcome)
    }

    pub async fn snapshot(&self, session_id: SessionId) -> WtResult<OnlineSnapshot> {
        let slot = self.registry.get(&session_id)?;
        let optimizer = slot.lock().await;
        slot.ensure_live()?;
        Ok(optimizer.snapshot())
    }

    /// Register a new session rebuilt from `snapshot`.
    pub fn restore(&self, snapshot: OnlineSnapshot) -> WtResult<SessionId> {
        let optimizer = OnlineOptimizer::restore(snapshot)?;
        self.registry.insert(optimizer)
    }

    /// Summaries of every live session, oldest first.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut summaries = Vec::with_capacity(self.registry.len());
        for slot in self.registry.slots() {
            let optimizer = slot.lock().await;
            if slot.is_deleted() {
                continue;
            }
            summaries.push(SessionSummary {
                session_id: slot.id(),
                signal_ids: slot.signal_ids().to_vec(),
                evaluation_count: optimizer.evaluation_count(),
                best_score: optimizer.best_evaluation().map(|e| e.score),
                created_at: slot.created_at(),
            });
        }
        summaries
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            active_sessions: self.registry.len(),
            batch_jobs: self.jobs.len(),
            worker_threads: self.pool.threads(),
        }
    }

    /// Queue a stateless batch suggestion job.
    ///
    /// With evaluated points the job returns `n_calls` surrogate-guided
    /// suggestions; without any it returns `n_initial_points` random ones.
    pub fn submit_batch_job(
        &self,
        bounds: Vec<SignalBound>,
        config: BatchConfig,
        evaluated: Vec<Evaluation>,
    ) -> WtResult<JobId> {
        let mut optimizer = BatchOptimizer::new(bounds, config)?;
        for evaluation in &evaluated {
            optimizer.space().check_weights(&evaluation.weights)?;
            evaluation.ensure_finite()?;
        }

        let job_id = self.jobs.submit();
        let jobs = Arc::clone(&self.jobs);
        let n_evaluated = evaluated.len();
        self.pool.spawn(move || {
            jobs.mark_running(&job_id);
            let outcome = run_batch_job(&mut optimizer, &evaluated);
            if let Err(e) = &outcome {
                warn!(job = %job_id, error = %e, "batch job failed");
            }
            jobs.finish(&job_id, outcome);
        });

        info!(job = %job_id, evaluated = n_evaluated, "batch job submitted");
        Ok(job_id)
    }

    pub fn job_status(&self, job_id: JobId) -> WtResult<BatchJob> {
        self.jobs.get(&job_id)
    }

    /// Forget a job. A job still running keeps running, but its result is
    /// no longer recorded.
    pub fn remove_job(&self, job_id: JobId) -> WtResult<BatchJob> {
        let job = self.jobs.remove(&job_id)?;
        debug!(job = %job_id, state = ?job.state, "batch job removed");
        Ok(job)
    }
}

fn run_batch_job(
    optimizer: &mut BatchOptimizer,
    evaluated: &[Evaluation],
) -> WtResult<BatchJobOutput> {
    if evaluated.is_empty() {
        let n = optimizer.config().n_initial_points;
        return Ok(BatchJobOutput {
            suggestions: optimizer.suggest_next(&[], n)?,
            message: Some(format!(
                "no evaluated points supplied; returning {n} initial random suggestions"
            )),
        });
    }

    let n = optimizer.config().n_calls;
    Ok(BatchJobOutput {
        suggestions: optimizer.suggest_next(evaluated, n)?,
        message: None,
    })
}

/// Hand a worker result to the caller unless the session died meanwhile.
fn deliver<T>(slot: &SessionSlot, operation: &str, outcome: WtResult<T>) -> WtResult<T> {
    if slot.is_deleted() {
        warn!(
            session = %slot.id(),
            operation,
            "discarding result for deleted session"
        );
        return Err(not_found(slot.id()).into());
    }
    outcome
}
