//! Built-in simulation scenarios.

use crate::config::SimConfig;
use crate::error::HarnessError;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Request/reply rounds over a clean network
    PingPong,

    /// Rumour flooding over a clean network
    Gossip,

    /// Periodic beacons until the end of the run
    Heartbeat,

    /// Rumour flooding across a split network
    Partition,

    /// Request/reply rounds with link loss and timeouts
    Lossy,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::PingPong,
            ScenarioId::Gossip,
            ScenarioId::Heartbeat,
            ScenarioId::Partition,
            ScenarioId::Lossy,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::PingPong => "ping_pong",
            ScenarioId::Gossip => "gossip",
            ScenarioId::Heartbeat => "heartbeat",
            ScenarioId::Partition => "partition",
            ScenarioId::Lossy => "lossy",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::PingPong => "Every agent pings its successor; all replies arrive in time",
            ScenarioId::Gossip => "Agent 0 floods a rumour; every agent hears it",
            ScenarioId::Heartbeat => "Timers beat until the end of the run; every peer is heard",
            ScenarioId::Partition => "Rumour flooding stays on the originator's side of a split",
            ScenarioId::Lossy => "Ping/pong under link loss; every request is answered or times out",
        }
    }

    /// Config for this scenario, derived from `base`.
    pub fn configure(&self, base: &SimConfig) -> SimConfig {
        let mut config = base.clone();
        match self {
            ScenarioId::PingPong => {
                config.behavior = "ping_pong".into();
                config.loss_rate = 0.0;
            }
            ScenarioId::Gossip | ScenarioId::Partition => {
                config.behavior = "gossip".into();
                config.loss_rate = 0.0;
            }
            ScenarioId::Heartbeat => {
                config.behavior = "heartbeat".into();
                config.loss_rate = 0.0;
            }
            ScenarioId::Lossy => {
                config.behavior = "ping_pong".into();
                if config.loss_rate == 0.0 {
                    config.loss_rate = 0.3;
                }
                config.rounds = config.rounds.max(5);
            }
        }
        config
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ping_pong" | "pingpong" => Ok(ScenarioId::PingPong),
            "gossip" => Ok(ScenarioId::Gossip),
            "heartbeat" => Ok(ScenarioId::Heartbeat),
            "partition" | "split" => Ok(ScenarioId::Partition),
            "lossy" => Ok(ScenarioId::Lossy),
            _ => Err(HarnessError::UnknownScenario(s.to_string())),
        }
    }
}
