//! Agent behaviors and the registry they are resolved from.
//!
//! A world resolves one behavior name through [`BehaviorRegistry`] when it
//! is built and asks the factory for one instance per agent.

mod gossip;
mod heartbeat;
mod ping_pong;

use std::collections::HashMap;
use std::sync::Arc;

use stepsim_env::{SimResult, StepContext};

use crate::config::SimConfig;
use crate::context::AgentCtx;
use crate::error::{HarnessError, HarnessResult};
use crate::network::{AgentId, Message};

pub use gossip::Gossip;
pub use heartbeat::Heartbeat;
pub use ping_pong::PingPong;

/// Domain logic of one agent.
///
/// Every hook runs inside a task owned by the agent, so hooks of one agent
/// never overlap; state still lives behind interior mutability because the
/// hooks take `&self` and may run on different worker threads.
pub trait AgentBehavior<C: StepContext>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once, at time 1.
    fn on_start(&self, _ctx: &AgentCtx<C>) -> SimResult<()> {
        Ok(())
    }

    fn on_message(&self, ctx: &AgentCtx<C>, message: Message) -> SimResult<()>;

    /// Called for each tick of a timer started with [`AgentCtx::start_timer`].
    fn on_timer(&self, _ctx: &AgentCtx<C>) -> SimResult<()> {
        Ok(())
    }

    /// Counters collected after the run.
    fn report(&self) -> BehaviorReport {
        BehaviorReport::default()
    }
}

/// Per-agent counters reported by a behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BehaviorReport {
    /// Requests sent (ping_pong)
    pub requests: u64,
    /// Requests answered in time
    pub replies: u64,
    /// Requests that timed out
    pub timeouts: u64,
    /// Waits cut short by the end of the run
    pub interrupted: u64,
    /// Requests this agent answered
    pub answered: u64,
    /// Whether the rumour reached this agent (gossip)
    pub informed: bool,
    /// Rumour copies forwarded
    pub forwarded: u64,
    /// Heartbeats sent
    pub beats_sent: u64,
    /// Heartbeats received
    pub beats_received: u64,
    /// Distinct peers heard from
    pub peers_heard: usize,
}

/// Builds the behavior of one agent.
pub type BehaviorFactory<C> =
    Arc<dyn Fn(&SimConfig, AgentId) -> Arc<dyn AgentBehavior<C>> + Send + Sync>;

/// String-keyed behavior factories.
pub struct BehaviorRegistry<C: StepContext> {
    factories: HashMap<String, BehaviorFactory<C>>,
}

impl<C: StepContext> BehaviorRegistry<C> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Creates a registry holding `ping_pong`, `gossip` and `heartbeat`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("ping_pong", |config, _| -> Arc<dyn AgentBehavior<C>> {
            Arc::new(PingPong::<C>::new(config.rounds, config.reply_timeout))
        });
        registry.register("gossip", |_, id| -> Arc<dyn AgentBehavior<C>> {
            Arc::new(Gossip::new(id == 0))
        });
        registry.register("heartbeat", |config, _| -> Arc<dyn AgentBehavior<C>> {
            Arc::new(Heartbeat::new(config.heartbeat_period))
        });
        registry
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&SimConfig, AgentId) -> Arc<dyn AgentBehavior<C>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn resolve(&self, name: &str) -> HarnessResult<BehaviorFactory<C>> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| HarnessError::UnknownBehavior(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<C: StepContext> Default for BehaviorRegistry<C> {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepsim_core::Scheduler;

    struct Silent;

    impl AgentBehavior<Scheduler> for Silent {
        fn name(&self) -> &'static str {
            "silent"
        }

        fn on_message(&self, _: &AgentCtx<Scheduler>, _: Message) -> SimResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_builtins() {
        let registry = BehaviorRegistry::<Scheduler>::with_builtins();
        assert_eq!(registry.names(), vec!["gossip", "heartbeat", "ping_pong"]);

        let config = SimConfig::default();
        let factory = registry.resolve("gossip").unwrap();
        assert_eq!(factory(&config, 0).name(), "gossip");
        assert!(!factory(&config, 0).report().informed);
    }

    #[test]
    fn test_unknown_behavior() {
        let registry = BehaviorRegistry::<Scheduler>::new();
        let err = registry.resolve("ping_pong").err().unwrap();
        assert!(matches!(err, HarnessError::UnknownBehavior(name) if name == "ping_pong"));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = BehaviorRegistry::<Scheduler>::default();
        registry.register("silent", |_, _| -> Arc<dyn AgentBehavior<Scheduler>> { Arc::new(Silent) });

        assert!(registry.contains("silent"));
        let factory = registry.resolve("silent").unwrap();
        assert_eq!(factory(&SimConfig::default(), 3).name(), "silent");
    }
}
