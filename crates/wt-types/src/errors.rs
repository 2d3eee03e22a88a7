use thiserror::Error;

/// Main error type for the WeightTune system
#[derive(Error, Debug)]
pub enum WtError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Numeric error: {0}")]
    Numeric(#[from] NumericError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Objective evaluation failed: {0}")]
    Objective(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WtError {
    /// True for the "unknown id" family, which callers must be able to tell
    /// apart from every other failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            WtError::Session(SessionError::NotFound { .. })
                | WtError::Session(SessionError::JobNotFound { .. })
        )
    }
}

/// Session registry errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Session not found: {session_id}")]
    NotFound { session_id: String },

    #[error("Batch job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("Session capacity reached: {limit} active sessions")]
    CapacityReached { limit: usize },
}

/// Failures raised by the surrogate model's linear algebra
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericError {
    #[error("Kernel matrix is not positive definite after jitter {jitter:e}")]
    NotPositiveDefinite { jitter: f64 },

    #[error("Surrogate produced a non-finite {quantity} at candidate {index}")]
    NonFinitePrediction { quantity: String, index: usize },

    #[error("Surrogate has not been fitted")]
    NotFitted,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type alias for WeightTune operations
pub type WtResult<T> = Result<T, WtError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::WtError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::WtError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::WtError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = NumericError::DimensionMismatch {
            expected: 3,
            actual: 2,
        };

        assert!(error.to_string().contains("expected 3"));
        assert!(error.to_string().contains("got 2"));
    }

    #[test]
    fn test_error_conversion() {
        let session_error = SessionError::NotFound {
            session_id: "abc".to_string(),
        };
        let wt_error: WtError = session_error.into();

        match wt_error {
            WtError::Session(SessionError::NotFound { ref session_id }) => {
                assert_eq!(session_id, "abc")
            }
            _ => panic!("Expected Session error"),
        }
        assert!(wt_error.is_not_found());
    }

    #[test]
    fn numeric_error_is_not_not_found() {
        let err: WtError = NumericError::NotFitted.into();
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_macros() {
        let validation_err = validation_error!("Invalid value: {}", 42);
        assert!(matches!(validation_err, WtError::Validation(_)));
        let _internal_err = internal_error!("Something went wrong");
        let config_err = config_error!("Missing required field: {}", "signal_id");
        assert!(config_err.to_string().contains("signal_id"));
    }
}
