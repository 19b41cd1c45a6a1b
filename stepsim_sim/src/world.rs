//! SimWorld - agents, network and engine of one simulation run.

use std::sync::Arc;
use std::time::Duration;

use stepsim_core::Scheduler;
use stepsim_env::FnTask;
use tracing::{info, warn};

use crate::agent::SimAgent;
use crate::behaviors::{BehaviorRegistry, BehaviorReport};
use crate::config::SimConfig;
use crate::context::AgentCtx;
use crate::error::HarnessResult;
use crate::network::{NetworkStats, SimNetwork};
use crate::seeds::DeterministicSeedProvider;

/// How long a finished run waits for interrupted tasks to unwind.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of [`SimWorld::run`].
#[derive(Debug, Clone, Default)]
pub struct WorldReport {
    /// Clock value when the run ended
    pub final_time: u64,

    /// Steps executed
    pub steps: u64,

    /// Agent task entries, resumptions included
    pub agent_entries: u64,

    /// Times an agent was found handling two events at once
    pub overlaps: u64,

    pub network: NetworkStats,

    /// One report per agent, by agent id
    pub behaviors: Vec<BehaviorReport>,
}

impl WorldReport {
    /// Sums a behavior counter over all agents.
    pub fn total(&self, field: impl Fn(&BehaviorReport) -> u64) -> u64 {
        self.behaviors.iter().map(field).sum()
    }

    pub fn informed_agents(&self) -> usize {
        self.behaviors.iter().filter(|r| r.informed).count()
    }
}

/// The SimWorld - container for one simulation.
pub struct SimWorld {
    config: SimConfig,
    seeds: DeterministicSeedProvider,
    scheduler: Scheduler,
    network: Arc<SimNetwork<Scheduler>>,
    agents: Vec<Arc<SimAgent<Scheduler>>>,
}

impl SimWorld {
    /// Creates a world using the built-in behaviors.
    pub fn new(config: SimConfig) -> HarnessResult<Self> {
        Self::with_registry(config, &BehaviorRegistry::with_builtins())
    }

    /// Creates a world, resolving `config.behavior` in `registry`.
    pub fn with_registry(config: SimConfig, registry: &BehaviorRegistry<Scheduler>) -> HarnessResult<Self> {
        config.validate()?;
        let factory = registry.resolve(&config.behavior)?;

        let scheduler = Scheduler::new(config.scheduler_config())?;
        let context = Arc::new(scheduler.clone());
        let seeds = DeterministicSeedProvider::new(config.seed);
        let network = Arc::new(SimNetwork::new(
            context.clone(),
            seeds,
            config.latency,
            config.loss_rate,
        ));

        let agents: Vec<_> = (0..config.num_agents)
            .map(|id| {
                let ctx = AgentCtx::new(id, seeds.owner_key(id), context.clone(), Arc::downgrade(&network));
                let agent = Arc::new(SimAgent::new(ctx, factory(&config, id)));
                network.register(agent.clone());
                agent
            })
            .collect();

        info!(
            seed = config.seed,
            agents = agents.len(),
            behavior = %config.behavior,
            "World created"
        );

        Ok(Self {
            config,
            seeds,
            scheduler,
            network,
            agents,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn seeds(&self) -> &DeterministicSeedProvider {
        &self.seeds
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Network controller for fault injection before the run.
    pub fn network(&self) -> &SimNetwork<Scheduler> {
        &self.network
    }

    pub fn agents(&self) -> &[Arc<SimAgent<Scheduler>>] {
        &self.agents
    }

    /// Starts every agent at time 1 and runs until the scheduler stops.
    pub fn run(&self) -> HarnessResult<WorldReport> {
        for agent in &self.agents {
            let owner = agent.owner_key();
            let agent = agent.clone();
            let task = FnTask::new(move || agent.start())
                .with_owner(owner)
                .named("agent-start");
            self.scheduler.schedule_once(task.boxed(), 1)?;
        }

        self.scheduler.start()?;
        self.scheduler.wait_until_ended();
        if !self.scheduler.executor().await_termination(DRAIN_TIMEOUT) {
            warn!("Interrupted tasks still running after the run ended");
        }

        let report = self.report();
        info!(
            time = report.final_time,
            steps = report.steps,
            sent = report.network.sent,
            delivered = report.network.delivered,
            overlaps = report.overlaps,
            "Run finished"
        );
        Ok(report)
    }

    /// Collects counters from the engine, the network and every agent.
    pub fn report(&self) -> WorldReport {
        WorldReport {
            final_time: self.scheduler.current_time(),
            steps: self.scheduler.steps(),
            agent_entries: self.agents.iter().map(|a| a.ctx().probe().entries()).sum(),
            overlaps: self.agents.iter().map(|a| a.ctx().probe().overlaps()).sum(),
            network: self.network.stats(),
            behaviors: self.agents.iter().map(|a| a.report()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;

    fn config(behavior: &str, agents: usize) -> SimConfig {
        SimConfig {
            num_agents: agents,
            behavior: behavior.to_string(),
            threads: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_unknown_behavior_rejected() {
        let err = SimWorld::new(config("flood", 2)).err().unwrap();
        assert!(matches!(err, HarnessError::UnknownBehavior(_)));
    }

    #[test]
    fn test_agents_get_distinct_owner_keys() {
        let world = SimWorld::new(config("gossip", 5)).unwrap();
        let mut keys: Vec<_> = world.agents().iter().map(|a| a.owner_key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 5);
        assert_eq!(world.network().num_agents(), 5);
    }

    #[test]
    fn test_ping_pong_run() {
        let world = SimWorld::new(config("ping_pong", 4)).unwrap();
        let report = world.run().unwrap();

        assert_eq!(report.total(|r| r.requests), 4 * 3);
        assert_eq!(report.total(|r| r.replies), 4 * 3);
        assert_eq!(report.total(|r| r.answered), 4 * 3);
        assert_eq!(report.total(|r| r.timeouts), 0);
        assert_eq!(report.overlaps, 0);
        // Round trips end at 7; the last reply timeout, armed at 5, fires at 13
        assert_eq!(report.final_time, 13);
        assert!(world.scheduler().is_killed());
    }

    #[test]
    fn test_gossip_reaches_everyone() {
        let world = SimWorld::new(config("gossip", 6)).unwrap();
        let report = world.run().unwrap();

        assert_eq!(report.informed_agents(), 6);
        assert_eq!(report.overlaps, 0);
        assert_eq!(report.network.dropped(), 0);
        assert_eq!(report.network.sent, report.network.delivered);
    }

    #[test]
    fn test_heartbeat_runs_to_max_duration() {
        let world = SimWorld::new(SimConfig {
            max_duration: 20,
            heartbeat_period: 5,
            ..config("heartbeat", 3)
        })
        .unwrap();
        let report = world.run().unwrap();

        // Timers start at 1 and tick at 6, 11 and 16
        for behavior in &report.behaviors {
            assert_eq!(behavior.beats_sent, 3);
            assert_eq!(behavior.beats_received, 6);
            assert_eq!(behavior.peers_heard, 2);
        }
        assert_eq!(report.final_time, 17);
        assert_eq!(report.overlaps, 0);
    }
}
