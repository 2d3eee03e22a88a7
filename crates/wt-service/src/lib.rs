//! # wt-service
//!
//! Concurrent front end for WeightTune online sessions.
//!
//! Sessions live in an owned [`SessionRegistry`]; each one is serialized by
//! its own async lock while surrogate fits run on a bounded
//! [`FitWorkerPool`]. [`TuningService`] exposes the caller operations
//! (create, suggest, record, best, delete) plus batch jobs, listing and
//! health.

mod config;
mod jobs;
mod pool;
mod registry;
mod service;
pub mod telemetry;

pub use config::ServiceConfig;
pub use jobs::{BatchJob, BatchJobOutput, JobTracker, DEFAULT_FINISHED_JOB_RETENTION};
pub use pool::FitWorkerPool;
pub use registry::{SessionRegistry, SessionSlot};
pub use service::{
    BestResponse, HealthReport, RecordResponse, SessionSummary, SuggestResponse, TuningService,
};
pub use telemetry::init_tracing;
