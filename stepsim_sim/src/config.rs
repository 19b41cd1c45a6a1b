//! Simulation run configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use stepsim_core::SchedulerConfig;

use crate::error::{HarnessError, HarnessResult};

/// Configuration for a simulation run.
///
/// Every field has a default, so a JSON file only needs the values it
/// changes:
///
/// ```json
/// { "seed": 7, "num_agents": 12, "behavior": "gossip" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of agents to spawn
    pub num_agents: usize,

    /// Last logical time at which tasks run
    pub max_duration: u64,

    /// Executor width (0 = number of CPUs)
    pub threads: usize,

    /// Registry name of the behavior given to every agent
    pub behavior: String,

    /// Default link latency in steps
    pub latency: u64,

    /// Default per-link loss probability (0.0 - 1.0)
    pub loss_rate: f64,

    /// Requests each ping_pong agent sends
    pub rounds: u64,

    /// Steps a ping_pong agent waits for a reply
    pub reply_timeout: u64,

    /// Steps between two heartbeats
    pub heartbeat_period: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_agents: 6,
            max_duration: 100,
            threads: 4,
            behavior: "ping_pong".to_string(),
            latency: 1,
            loss_rate: 0.0,
            rounds: 3,
            reply_timeout: 8,
            heartbeat_period: 5,
        }
    }
}

impl SimConfig {
    /// Loads and validates a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| HarnessError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| HarnessError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> HarnessResult<()> {
        let positive = [
            ("max_duration", self.max_duration),
            ("latency", self.latency),
            ("rounds", self.rounds),
            ("reply_timeout", self.reply_timeout),
            ("heartbeat_period", self.heartbeat_period),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(HarnessError::InvalidConfig(format!("{field} must be >= 1")));
            }
        }
        if self.num_agents == 0 {
            return Err(HarnessError::InvalidConfig("num_agents must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(HarnessError::InvalidConfig(format!(
                "loss_rate must be within [0, 1], got {}",
                self.loss_rate
            )));
        }
        Ok(())
    }

    /// Scheduler settings derived from this config.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new(self.max_duration).with_threads(self.threads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("stepsim-{}-{}", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_default_is_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler_config().max_duration, 100);
        assert_eq!(config.scheduler_config().max_running_threads, 4);
    }

    #[test]
    fn test_partial_json_file() {
        let path = temp_file("partial.json", r#"{ "seed": 7, "behavior": "gossip" }"#);
        let config = SimConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.seed, 7);
        assert_eq!(config.behavior, "gossip");
        assert_eq!(config.num_agents, SimConfig::default().num_agents);
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let path = temp_file("lossy.json", r#"{ "loss_rate": 1.5 }"#);
        let err = SimConfig::from_json_file(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));

        let config = SimConfig {
            latency: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(HarnessError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let err = SimConfig::from_json_file("/nonexistent/stepsim.json").unwrap_err();
        assert!(matches!(err, HarnessError::ConfigIo { .. }));
        assert_eq!(err.exit_code(), 2);

        let path = temp_file("broken.json", "{ seed: ");
        let err = SimConfig::from_json_file(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, HarnessError::ConfigParse { .. }));
    }
}
