//! # wt-optimizer
//!
//! Bayesian optimization of signal weights for WeightTune.
//!
//! Provides the search space over bounded weights, Gaussian-process and
//! bootstrap-ensemble surrogates, Expected Improvement acquisition, the
//! fixed-budget [`BatchOptimizer`] and the sliding-window [`OnlineOptimizer`].

pub mod acquisition;
mod batch;
mod linalg;
mod online;
pub mod report;
mod run;
mod search;
pub mod surrogate;

pub use acquisition::{expected_improvement, norm_cdf, norm_pdf, CandidatePick};
pub use batch::{
    BatchConfig, BatchOptimizer, BatchPhase, MIN_POINTS_FOR_IMPORTANCE, MIN_POINTS_FOR_MODEL,
};
pub use online::{
    EvaluationWindow, OnlineConfig, OnlineOptimizer, OnlineSnapshot, MIN_POINTS_FOR_EXPLOITATION,
};
pub use report::WindowStatistics;
pub use run::{BatchRun, OptimizationResult, OptimizationState};
pub use search::{simplex_normalize, SearchSpace};
pub use surrogate::{
    BootstrapEnsemble, GaussianProcess, KernelKind, Prediction, SurrogateConfig, SurrogateModel,
};
