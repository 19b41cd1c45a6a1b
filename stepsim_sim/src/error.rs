//! Error types for the simulation harness.

use std::path::PathBuf;

use stepsim_env::SimError;
use thiserror::Error;

/// Errors raised while configuring or running a simulation.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Config file could not be read
    #[error("Failed to read config {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for [`crate::SimConfig`]
    #[error("Failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Config values out of range
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// No behavior registered under this name
    #[error("Unknown behavior: {0}")]
    UnknownBehavior(String),

    /// No scenario with this name
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    /// The engine refused an operation
    #[error("Engine error: {0}")]
    Engine(#[from] SimError),
}

impl HarnessError {
    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigIo { .. } | Self::ConfigParse { .. } | Self::InvalidConfig(_) => 2,
            Self::UnknownBehavior(_) | Self::UnknownScenario(_) => 3,
            Self::Engine(_) => 1,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_convert() {
        let err: HarnessError = SimError::ForcedWakeUp.into();
        assert!(matches!(err, HarnessError::Engine(SimError::ForcedWakeUp)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(HarnessError::InvalidConfig("x".into()).exit_code(), 2);
        assert_eq!(HarnessError::UnknownScenario("x".into()).exit_code(), 3);
        assert_eq!(
            HarnessError::UnknownBehavior("flood".into()).to_string(),
            "Unknown behavior: flood"
        );
    }
}
