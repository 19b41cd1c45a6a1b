//! Scenario runner - executes scenarios and checks their invariants.

use tracing::{debug, info};

use crate::config::SimConfig;
use crate::error::HarnessResult;
use crate::scenarios::ScenarioId;
use crate::world::{SimWorld, WorldReport};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Steps executed
    pub steps: u64,

    /// Clock value when the run ended
    pub final_time: u64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioMetrics {
    /// Messages handed to the network
    pub messages_sent: u64,

    /// Messages that reached their receiver
    pub messages_delivered: u64,

    /// Messages dropped by link loss
    pub messages_lost: u64,

    /// Messages dropped by a partition
    pub messages_partitioned: u64,

    /// Largest latency used, in steps
    pub max_latency: u64,

    /// Ping requests sent
    pub requests: u64,

    /// Ping requests answered in time
    pub replies: u64,

    /// Ping requests that timed out
    pub timeouts: u64,

    /// Agents that heard the rumour
    pub informed_agents: usize,

    /// Heartbeats received
    pub heartbeats: u64,

    /// Agent exclusivity violations
    pub overlaps: u64,
}

impl From<&WorldReport> for ScenarioMetrics {
    fn from(report: &WorldReport) -> Self {
        Self {
            messages_sent: report.network.sent,
            messages_delivered: report.network.delivered,
            messages_lost: report.network.lost,
            messages_partitioned: report.network.partitioned,
            max_latency: report.network.max_latency,
            requests: report.total(|r| r.requests),
            replies: report.total(|r| r.replies),
            timeouts: report.total(|r| r.timeouts),
            informed_agents: report.informed_agents(),
            heartbeats: report.total(|r| r.beats_received),
            overlaps: report.overlaps,
        }
    }
}

/// Runs scenarios from a base configuration.
pub struct ScenarioRunner {
    base: SimConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_agents: usize) -> Self {
        Self::from_config(SimConfig {
            seed,
            num_agents,
            ..Default::default()
        })
    }

    /// Creates a runner from a full base config.
    pub fn from_config(base: SimConfig) -> Self {
        Self { base }
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, max_duration: u64) -> Self {
        self.base.max_duration = max_duration;
        self
    }

    /// Sets the executor width.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.base.threads = threads;
        self
    }

    pub fn base_config(&self) -> &SimConfig {
        &self.base
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        let config = scenario.configure(&self.base);
        info!("Starting scenario: {} (seed={})", scenario.name(), config.seed);

        let (report, verdict) = match self.execute(scenario, &config) {
            Ok(report) => {
                let verdict = check(scenario, &config, &report);
                (report, verdict)
            }
            Err(e) => (WorldReport::default(), Err(e.to_string())),
        };

        debug!(scenario = scenario.name(), network = ?report.network, "Scenario finished");

        ScenarioResult {
            scenario,
            seed: config.seed,
            passed: verdict.is_ok(),
            steps: report.steps,
            final_time: report.final_time,
            failure_reason: verdict.err(),
            metrics: ScenarioMetrics::from(&report),
        }
    }

    fn execute(&self, scenario: ScenarioId, config: &SimConfig) -> HarnessResult<WorldReport> {
        let world = SimWorld::new(config.clone())?;

        if scenario == ScenarioId::Partition {
            let (group_a, group_b) = split_halves(config.num_agents);
            info!("Partitioning {:?} | {:?}", group_a, group_b);
            world.network().partition(group_a, group_b);
        }

        world.run()
    }
}

/// Agent 0 and the lower half on one side, the rest on the other.
fn split_halves(num_agents: usize) -> (Vec<usize>, Vec<usize>) {
    let boundary = (num_agents + 1) / 2;
    ((0..boundary).collect(), (boundary..num_agents).collect())
}

fn check(scenario: ScenarioId, config: &SimConfig, report: &WorldReport) -> Result<(), String> {
    if report.overlaps > 0 {
        return Err(format!("{} agent exclusivity violations", report.overlaps));
    }

    let n = config.num_agents;
    let requests = report.total(|r| r.requests);
    let replies = report.total(|r| r.replies);
    let timeouts = report.total(|r| r.timeouts);
    let interrupted = report.total(|r| r.interrupted);

    match scenario {
        ScenarioId::PingPong => {
            let expected = if n >= 2 { n as u64 * config.rounds } else { 0 };
            if requests != expected || replies != expected {
                return Err(format!(
                    "expected {expected} answered requests, got {replies}/{requests}"
                ));
            }
            if timeouts + interrupted > 0 {
                return Err(format!("{timeouts} timeouts, {interrupted} interrupted waits"));
            }
        }
        ScenarioId::Lossy => {
            if replies + timeouts + interrupted != requests {
                return Err(format!(
                    "unaccounted requests: {requests} sent, {replies} replies, \
                     {timeouts} timeouts, {interrupted} interrupted"
                ));
            }
        }
        ScenarioId::Gossip => {
            if report.informed_agents() != n {
                return Err(format!("rumour reached {}/{} agents", report.informed_agents(), n));
            }
        }
        ScenarioId::Partition => {
            if n < 2 {
                return Err("partition needs at least 2 agents".into());
            }
            let (group_a, _) = split_halves(n);
            if report.informed_agents() != group_a.len() {
                return Err(format!(
                    "rumour reached {} agents, expected {} on the originator's side",
                    report.informed_agents(),
                    group_a.len()
                ));
            }
            if report.network.partitioned == 0 {
                return Err("no message hit the partition".into());
            }
        }
        ScenarioId::Heartbeat => {
            let expected_beats = (config.max_duration - 1) / config.heartbeat_period;
            let first_arrival = 1 + config.heartbeat_period + config.latency;
            for (id, behavior) in report.behaviors.iter().enumerate() {
                if behavior.beats_sent != expected_beats {
                    return Err(format!(
                        "agent {id} sent {} beats, expected {expected_beats}",
                        behavior.beats_sent
                    ));
                }
                if first_arrival <= config.max_duration && behavior.peers_heard != n - 1 {
                    return Err(format!("agent {id} heard {}/{} peers", behavior.peers_heard, n - 1));
                }
            }
            if report.final_time > config.max_duration {
                return Err(format!("clock ran past max_duration: {}", report.final_time));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_halves() {
        assert_eq!(split_halves(5), (vec![0, 1, 2], vec![3, 4]));
        assert_eq!(split_halves(2), (vec![0], vec![1]));
    }

    #[test]
    fn test_all_scenarios_pass() {
        let runner = ScenarioRunner::new(42, 5).with_threads(3);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario);
            assert!(
                result.passed,
                "{} failed: {:?}",
                scenario.name(),
                result.failure_reason
            );
            assert_eq!(result.metrics.overlaps, 0);
        }
    }

    #[test]
    fn test_partition_metrics() {
        let result = ScenarioRunner::new(7, 4).run(ScenarioId::Partition);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.informed_agents, 2);
        assert!(result.metrics.messages_partitioned > 0);
    }

    #[test]
    fn test_lossy_drops_messages() {
        let result = ScenarioRunner::new(3, 6).run(ScenarioId::Lossy);

        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.messages_lost > 0);
        assert!(result.metrics.requests > 0);
    }

    #[test]
    fn test_invalid_config_fails_scenario() {
        let result = ScenarioRunner::new(1, 0).run(ScenarioId::Gossip);

        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("num_agents"));
    }
}
