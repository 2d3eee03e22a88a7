//! Background batch-suggestion jobs.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use wt_optimizer::OptimizationState;
use wt_types::{JobId, SessionError, WeightVector, WtError, WtResult};

/// Output of a finished batch job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJobOutput {
    pub suggestions: Vec<WeightVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Status record returned by `job_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub job_id: JobId,
    pub state: OptimizationState,
    /// 0 until the job finishes, then 100.
    pub progress: u8,
    pub output: Option<BatchJobOutput>,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    fn pending(job_id: JobId) -> Self {
        Self {
            job_id,
            state: OptimizationState::Pending,
            progress: 0,
            output: None,
            error: None,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            OptimizationState::Completed | OptimizationState::Failed
        )
    }
}

/// Finished jobs kept for `job_status` before the oldest are dropped.
pub const DEFAULT_FINISHED_JOB_RETENTION: usize = 256;

/// Job table. Pending and running jobs are always kept; once more than
/// `retain_finished` jobs have finished, the oldest finished ones are evicted.
pub struct JobTracker {
    jobs: DashMap<JobId, BatchJob>,
    retain_finished: usize,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::with_retention(DEFAULT_FINISHED_JOB_RETENTION)
    }
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retain_finished: usize) -> Self {
        Self {
            jobs: DashMap::new(),
            retain_finished,
        }
    }

    pub fn submit(&self) -> JobId {
        let id = Uuid::new_v4();
        self.jobs.insert(id, BatchJob::pending(id));
        id
    }

    pub fn mark_running(&self, id: &JobId) {
        if let Some(mut job) = self.jobs.get_mut(id) {
            job.state = OptimizationState::Running;
        }
    }

    /// Record the outcome. Older finished jobs past the retention limit are
    /// evicted before this one is marked finished.
    pub fn finish(&self, id: &JobId, outcome: WtResult<BatchJobOutput>) {
        if !self.jobs.contains_key(id) {
            return;
        }
        self.evict_finished(self.retain_finished.saturating_sub(1));
        if let Some(mut job) = self.jobs.get_mut(id) {
            match outcome {
                Ok(output) => {
                    job.state = OptimizationState::Completed;
                    job.output = Some(output);
                }
                Err(e) => {
                    job.state = OptimizationState::Failed;
                    job.error = Some(e.to_string());
                }
            }
            job.progress = 100;
            job.finished_at = Some(Utc::now());
        }
    }

    /// Drop a job record. Unknown ids are `JobNotFound`.
    pub fn remove(&self, id: &JobId) -> WtResult<BatchJob> {
        self.jobs
            .remove(id)
            .map(|(_, job)| job)
            .ok_or_else(|| job_not_found(id))
    }

    pub fn get(&self, id: &JobId) -> WtResult<BatchJob> {
        self.jobs
            .get(id)
            .map(|job| job.clone())
            .ok_or_else(|| job_not_found(id))
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn evict_finished(&self, keep: usize) {
        let mut finished: Vec<(DateTime<Utc>, JobId)> = self
            .jobs
            .iter()
            .filter_map(|entry| entry.finished_at.map(|at| (at, entry.job_id)))
            .collect();
        if finished.len() <= keep {
            return;
        }
        finished.sort();
        let excess = finished.len() - keep;
        for (_, id) in finished.into_iter().take(excess) {
            self.jobs.remove(&id);
        }
        debug!(evicted = excess, "dropped oldest finished batch jobs");
    }
}

fn job_not_found(id: &JobId) -> WtError {
    SessionError::JobNotFound {
        job_id: id.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_lifecycle() {
        let tracker = JobTracker::new();
        let id = tracker.submit();
        let job = tracker.get(&id).unwrap();
        assert_eq!(job.state, OptimizationState::Pending);
        assert_eq!(job.progress, 0);

        tracker.mark_running(&id);
        assert_eq!(tracker.get(&id).unwrap().state, OptimizationState::Running);

        tracker.finish(
            &id,
            Ok(BatchJobOutput {
                suggestions: vec![WeightVector::new().with("a", 1.0)],
                message: None,
            }),
        );
        let job = tracker.get(&id).unwrap();
        assert!(job.is_finished());
        assert_eq!(job.state, OptimizationState::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.output.unwrap().suggestions.len(), 1);
    }

    #[test]
    fn failed_job_keeps_reason() {
        let tracker = JobTracker::new();
        let id = tracker.submit();
        tracker.finish(&id, Err(WtError::Internal("fit crashed".into())));
        let job = tracker.get(&id).unwrap();
        assert_eq!(job.state, OptimizationState::Failed);
        assert!(job.error.unwrap().contains("fit crashed"));
    }

    fn done() -> WtResult<BatchJobOutput> {
        Ok(BatchJobOutput {
            suggestions: Vec::new(),
            message: None,
        })
    }

    #[test]
    fn oldest_finished_jobs_are_evicted() {
        let tracker = JobTracker::with_retention(2);
        let running = tracker.submit();
        tracker.mark_running(&running);

        let finished: Vec<JobId> = (0..3)
            .map(|_| {
                let id = tracker.submit();
                tracker.finish(&id, done());
                std::thread::sleep(std::time::Duration::from_millis(2));
                id
            })
            .collect();

        assert_eq!(tracker.len(), 3);
        assert!(tracker.get(&finished[0]).unwrap_err().is_not_found());
        assert!(tracker.get(&finished[1]).unwrap().is_finished());
        assert!(tracker.get(&finished[2]).unwrap().is_finished());
        assert_eq!(tracker.get(&running).unwrap().state, OptimizationState::Running);
    }

    #[test]
    fn remove_drops_the_record() {
        let tracker = JobTracker::new();
        let id = tracker.submit();
        tracker.finish(&id, done());
        assert_eq!(tracker.remove(&id).unwrap().job_id, id);
        assert!(tracker.get(&id).unwrap_err().is_not_found());
        assert!(tracker.remove(&id).unwrap_err().is_not_found());
    }

    #[test]
    fn unknown_job_is_not_found() {
        let tracker = JobTracker::new();
        assert!(tracker.get(&Uuid::new_v4()).unwrap_err().is_not_found());
        assert!(tracker.is_empty());
    }
}
