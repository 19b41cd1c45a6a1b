//! stepsim Simulation Harness
//!
//! Runs multi-agent systems on the `stepsim_core` engine. Each agent's
//! work (start hook, message deliveries, timer ticks) is a task owned by
//! the agent, so an agent never handles two events at once while different
//! agents run in parallel.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                         SimWorld                          │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │ Scheduler (logical clock) ─► Executor (worker pool)  │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! │       ▲                           ▲                       │
//! │  ┌────┴────┐    SimNetwork   ┌────┴────┐                  │
//! │  │  Agent  │◄───────────────►│  Agent  │     ...          │
//! │  │   #0    │ delivery tasks  │   #1    │                  │
//! │  └─────────┘                 └─────────┘                  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use stepsim_sim::{SimConfig, SimWorld};
//!
//! let config = SimConfig {
//!     seed: 42,
//!     num_agents: 6,
//!     behavior: "gossip".into(),
//!     ..Default::default()
//! };
//!
//! let report = SimWorld::new(config)?.run()?;
//! assert_eq!(report.informed_agents(), 6);
//! ```

mod agent;
pub mod behaviors;
mod config;
mod context;
mod error;
mod network;
mod runner;
pub mod scenarios;
mod seeds;
mod world;

pub use agent::SimAgent;
pub use behaviors::{AgentBehavior, BehaviorFactory, BehaviorRegistry, BehaviorReport};
pub use config::SimConfig;
pub use context::{AgentCtx, ExclusionProbe, ProbeGuard};
pub use error::{HarnessError, HarnessResult};
pub use network::{AgentId, Delivery, Message, NetworkStats, Payload, SimNetwork};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use seeds::DeterministicSeedProvider;
pub use world::{SimWorld, WorldReport};
