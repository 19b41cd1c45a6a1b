//! Error types shared by the stepsim engine and the code running on it.

use thiserror::Error;

/// Errors raised by the scheduler, the executor, or a task body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// Operation attempted on a killed scheduler or a shut-down executor
    #[error("Scheduling rejected: {0}")]
    SchedulingRejected(String),

    /// Non-positive waiting time, repetition count or step, or a target
    /// time that is not strictly in the future
    #[error("Invalid schedule parameter: {0}")]
    InvalidScheduleParameter(String),

    /// A suspended task was interrupted instead of being woken up
    #[error("Forced wake-up: the executor interrupted a suspended task")]
    ForcedWakeUp,

    /// Executor-only operation called from a thread outside the pool
    #[error("Not running on an executor worker thread")]
    ExecutorContextViolation,

    /// A task body failed (returned an error or panicked)
    #[error("Task execution failed: {0}")]
    TaskExecutionFailure(String),

    /// Lifecycle violation (e.g. starting a scheduler twice)
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    /// The OS refused to spawn a worker thread
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(String),
}

impl SimError {
    /// Creates a rejection error.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::SchedulingRejected(msg.into())
    }

    /// Creates an invalid-parameter error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidScheduleParameter(msg.into())
    }

    /// Creates a task failure from anything displayable.
    pub fn task_failure(msg: impl std::fmt::Display) -> Self {
        Self::TaskExecutionFailure(msg.to_string())
    }

    /// Creates a lifecycle violation error.
    pub fn invalid_state(operation: &'static str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// Returns true if this error is the shutdown interrupt signal.
    pub fn is_forced_wake_up(&self) -> bool {
        matches!(self, Self::ForcedWakeUp)
    }
}

/// Convenience alias used across the workspace.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SimError::invalid_parameter("step must be >= 1, got 0");
        assert_eq!(
            err.to_string(),
            "Invalid schedule parameter: step must be >= 1, got 0"
        );

        let err = SimError::invalid_state("start", "STARTED");
        assert_eq!(err.to_string(), "Cannot start while STARTED");
    }

    #[test]
    fn test_forced_wake_up_detection() {
        assert!(SimError::ForcedWakeUp.is_forced_wake_up());
        assert!(!SimError::rejected("killed").is_forced_wake_up());
    }
}
