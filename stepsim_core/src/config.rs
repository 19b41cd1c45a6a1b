//! Scheduler configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for a [`crate::Scheduler`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Last logical time at which tasks may run
    pub max_duration: u64,

    /// Maximum concurrently running tasks (0 = number of CPU cores)
    pub max_running_threads: usize,

    /// How often the step watcher re-checks for a kill while waiting for
    /// the executor to go quiet
    #[serde(rename = "watcher_poll_ms", with = "millis")]
    pub watcher_poll: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_duration: 1_000,
            max_running_threads: 0,
            watcher_poll: Duration::from_millis(50),
        }
    }
}

impl SchedulerConfig {
    /// Creates a configuration with the given end time.
    pub fn new(max_duration: u64) -> Self {
        Self {
            max_duration,
            ..Default::default()
        }
    }

    /// Sets the end time.
    pub fn with_max_duration(mut self, max_duration: u64) -> Self {
        self.max_duration = max_duration;
        self
    }

    /// Sets the pool width.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.max_running_threads = threads;
        self
    }

    /// Sets the watcher poll interval.
    pub fn with_watcher_poll(mut self, poll: Duration) -> Self {
        self.watcher_poll = poll;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = SchedulerConfig::new(10)
            .with_threads(4)
            .with_watcher_poll(Duration::from_millis(5));

        assert_eq!(config.max_duration, 10);
        assert_eq!(config.max_running_threads, 4);
        assert_eq!(config.watcher_poll, Duration::from_millis(5));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{ "max_duration": 25, "watcher_poll_ms": 10 }"#).unwrap();

        assert_eq!(config.max_duration, 25);
        assert_eq!(config.max_running_threads, 0);
        assert_eq!(config.watcher_poll, Duration::from_millis(10));
    }
}
