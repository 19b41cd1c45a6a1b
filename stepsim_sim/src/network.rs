//! Step-delay message network with fault injection.
//!
//! Every [`SimNetwork::send`] becomes a delivery task scheduled
//! `latency` steps ahead and owned by the receiving agent, so the
//! executor serializes a receiver's messages against its other work.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use stepsim_env::{FnTask, SimError, SimResult, StepContext};
use tracing::trace;

use crate::agent::SimAgent;
use crate::seeds::DeterministicSeedProvider;

/// Index of an agent in the world.
pub type AgentId = usize;

/// Application payloads exchanged by the built-in behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Ping { seq: u64 },
    Pong { seq: u64 },
    Rumour { id: u64 },
    Heartbeat { beat: u64 },
}

/// A message in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub from: AgentId,
    pub to: AgentId,
    pub payload: Payload,
    /// Logical time at which it was sent
    pub sent_at: u64,
}

/// What happened to a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Delivery task scheduled at this time
    Scheduled { at: u64 },
    /// Dropped by link loss
    Lost,
    /// Dropped because sender and receiver are partitioned
    Partitioned,
}

/// Snapshot of the network counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub sent: u64,
    pub delivered: u64,
    pub lost: u64,
    pub partitioned: u64,
    pub max_latency: u64,
}

impl NetworkStats {
    /// Messages that never reached a delivery task.
    pub fn dropped(&self) -> u64 {
        self.lost + self.partitioned
    }
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    delivered: AtomicU64,
    lost: AtomicU64,
    partitioned: AtomicU64,
    max_latency: AtomicU64,
}

/// The simulated network shared by all agents of a world.
pub struct SimNetwork<C: StepContext> {
    context: Arc<C>,
    seeds: DeterministicSeedProvider,
    agents: RwLock<HashMap<AgentId, Arc<SimAgent<C>>>>,

    default_latency: u64,
    default_loss: f64,

    /// Per-link latency in steps
    link_latency: Mutex<HashMap<(AgentId, AgentId), u64>>,

    /// Per-link loss rate (0.0 - 1.0)
    link_loss: Mutex<HashMap<(AgentId, AgentId), f64>>,

    /// Active partitions (groups that cannot communicate)
    partitions: Mutex<Vec<(Vec<AgentId>, Vec<AgentId>)>>,

    /// Loss RNG per sender
    loss_rngs: Mutex<HashMap<AgentId, ChaCha8Rng>>,

    counters: Arc<Counters>,
}

impl<C: StepContext> SimNetwork<C> {
    /// Creates a network with uniform link latency and loss.
    pub fn new(context: Arc<C>, seeds: DeterministicSeedProvider, latency: u64, loss_rate: f64) -> Self {
        Self {
            context,
            seeds,
            agents: RwLock::new(HashMap::new()),
            default_latency: latency.max(1),
            default_loss: loss_rate.clamp(0.0, 1.0),
            link_latency: Mutex::new(HashMap::new()),
            link_loss: Mutex::new(HashMap::new()),
            partitions: Mutex::new(Vec::new()),
            loss_rngs: Mutex::new(HashMap::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Registers an agent as a message destination.
    pub fn register(&self, agent: Arc<SimAgent<C>>) {
        self.agents.write().insert(agent.id(), agent);
    }

    pub fn agent(&self, id: AgentId) -> Option<Arc<SimAgent<C>>> {
        self.agents.read().get(&id).cloned()
    }

    /// Registered agent ids in ascending order.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self.agents.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn num_agents(&self) -> usize {
        self.agents.read().len()
    }

    /// Sets latency for a specific link (at least one step).
    pub fn set_latency(&self, from: AgentId, to: AgentId, steps: u64) {
        self.link_latency.lock().insert((from, to), steps.max(1));
    }

    /// Sets packet loss rate for a link.
    pub fn set_loss(&self, from: AgentId, to: AgentId, loss_rate: f64) {
        self.link_loss.lock().insert((from, to), loss_rate.clamp(0.0, 1.0));
    }

    pub fn latency(&self, from: AgentId, to: AgentId) -> u64 {
        self.link_latency
            .lock()
            .get(&(from, to))
            .copied()
            .unwrap_or(self.default_latency)
    }

    pub fn loss(&self, from: AgentId, to: AgentId) -> f64 {
        self.link_loss
            .lock()
            .get(&(from, to))
            .copied()
            .unwrap_or(self.default_loss)
    }

    /// Creates a network partition between two groups.
    pub fn partition(&self, group_a: Vec<AgentId>, group_b: Vec<AgentId>) {
        self.partitions.lock().push((group_a, group_b));
    }

    /// Heals all active partitions.
    pub fn heal_all(&self) {
        self.partitions.lock().clear();
    }

    /// Checks if two agents can communicate (not partitioned).
    pub fn can_communicate(&self, from: AgentId, to: AgentId) -> bool {
        let partitions = self.partitions.lock();

        for (group_a, group_b) in partitions.iter() {
            let from_in_a = group_a.contains(&from);
            let from_in_b = group_b.contains(&from);
            let to_in_a = group_a.contains(&to);
            let to_in_b = group_b.contains(&to);

            if (from_in_a && to_in_b) || (from_in_b && to_in_a) {
                return false;
            }
        }

        true
    }

    fn roll_loss(&self, from: AgentId, to: AgentId) -> bool {
        let loss = self.loss(from, to);
        if loss <= 0.0 {
            return false;
        }
        let mut rngs = self.loss_rngs.lock();
        let rng = rngs.entry(from).or_insert_with(|| self.seeds.link_rng(from));
        rng.gen::<f64>() < loss
    }

    /// Sends `payload` from `from` to `to`.
    ///
    /// # Returns
    /// * `Ok(Delivery)` - scheduled, or dropped by a fault
    /// * `Err(SimError::InvalidScheduleParameter)` - unknown receiver
    /// * `Err(SimError::SchedulingRejected)` - the simulation has ended
    pub fn send(&self, from: AgentId, to: AgentId, payload: Payload) -> SimResult<Delivery> {
        let target = self
            .agent(to)
            .ok_or_else(|| SimError::invalid_parameter(format!("unknown agent {to}")))?;
        self.counters.sent.fetch_add(1, Ordering::Relaxed);

        if !self.can_communicate(from, to) {
            self.counters.partitioned.fetch_add(1, Ordering::Relaxed);
            trace!(from, to, ?payload, "Dropped by partition");
            return Ok(Delivery::Partitioned);
        }
        if self.roll_loss(from, to) {
            self.counters.lost.fetch_add(1, Ordering::Relaxed);
            trace!(from, to, ?payload, "Dropped by link loss");
            return Ok(Delivery::Lost);
        }

        let now = self.context.current_time();
        let latency = self.latency(from, to);
        let message = Message {
            from,
            to,
            payload,
            sent_at: now,
        };
        let owner = target.owner_key();
        let counters = self.counters.clone();
        let task = FnTask::new(move || {
            counters.delivered.fetch_add(1, Ordering::Relaxed);
            target.receive(message)
        })
        .with_owner(owner)
        .named("deliver");

        self.context.schedule_once(task.boxed(), latency)?;
        self.counters.max_latency.fetch_max(latency, Ordering::Relaxed);
        Ok(Delivery::Scheduled { at: now + latency })
    }

    /// Sends `payload` to every other registered agent.
    ///
    /// Returns the number of deliveries scheduled.
    pub fn broadcast(&self, from: AgentId, payload: Payload) -> SimResult<usize> {
        let mut scheduled = 0;
        for to in self.agent_ids() {
            if to == from {
                continue;
            }
            if let Delivery::Scheduled { .. } = self.send(from, to, payload)? {
                scheduled += 1;
            }
        }
        Ok(scheduled)
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            lost: self.counters.lost.load(Ordering::Relaxed),
            partitioned: self.counters.partitioned.load(Ordering::Relaxed),
            max_latency: self.counters.max_latency.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviors::AgentBehavior;
    use crate::context::AgentCtx;
    use std::time::Duration;
    use stepsim_core::{Scheduler, SchedulerConfig};

    #[derive(Default)]
    struct Recorder {
        inbox: Mutex<Vec<(u64, Message)>>,
    }

    impl AgentBehavior<Scheduler> for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn on_message(&self, ctx: &AgentCtx<Scheduler>, message: Message) -> SimResult<()> {
            self.inbox.lock().push((ctx.now(), message));
            Ok(())
        }
    }

    fn setup(agents: usize, latency: u64, loss: f64) -> (Scheduler, Arc<SimNetwork<Scheduler>>, Vec<Arc<Recorder>>) {
        let scheduler = Scheduler::new(
            SchedulerConfig::new(50).with_threads(2).with_watcher_poll(Duration::from_millis(5)),
        )
        .unwrap();
        let context = Arc::new(scheduler.clone());
        let seeds = DeterministicSeedProvider::new(42);
        let network = Arc::new(SimNetwork::new(context.clone(), seeds, latency, loss));

        let mut recorders = Vec::new();
        for id in 0..agents {
            let recorder = Arc::new(Recorder::default());
            let ctx = AgentCtx::new(id, seeds.owner_key(id), context.clone(), Arc::downgrade(&network));
            network.register(Arc::new(SimAgent::new(ctx, recorder.clone())));
            recorders.push(recorder);
        }
        (scheduler, network, recorders)
    }

    #[test]
    fn test_partition_and_heal() {
        let (_, network, _) = setup(4, 1, 0.0);

        network.partition(vec![0, 1], vec![2, 3]);
        assert!(network.can_communicate(0, 1));
        assert!(!network.can_communicate(0, 2));
        assert!(!network.can_communicate(3, 1));

        network.heal_all();
        assert!(network.can_communicate(0, 2));
    }

    #[test]
    fn test_link_settings() {
        let (_, network, _) = setup(2, 3, 0.0);

        assert_eq!(network.latency(0, 1), 3);
        network.set_latency(0, 1, 0);
        assert_eq!(network.latency(0, 1), 1);
        assert_eq!(network.latency(1, 0), 3);

        network.set_loss(0, 1, 7.0);
        assert_eq!(network.loss(0, 1), 1.0);
        assert_eq!(network.loss(1, 0), 0.0);
    }

    #[test]
    fn test_delivery_runs_at_latency() {
        let (scheduler, network, recorders) = setup(2, 3, 0.0);

        let outcome = network.send(0, 1, Payload::Ping { seq: 9 }).unwrap();
        assert_eq!(outcome, Delivery::Scheduled { at: 3 });
        assert_eq!(scheduler.pending_tasks(), 1);

        scheduler.start().unwrap();
        assert!(scheduler.wait_until_ended_timeout(Duration::from_secs(10)));

        let inbox = recorders[1].inbox.lock();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].0, 3);
        assert_eq!(inbox[0].1.payload, Payload::Ping { seq: 9 });
        assert_eq!(inbox[0].1.from, 0);
        assert!(recorders[0].inbox.lock().is_empty());
        assert_eq!(network.stats().delivered, 1);
    }

    #[test]
    fn test_faults_are_counted() {
        let (scheduler, network, _) = setup(3, 1, 0.0);

        network.partition(vec![0], vec![1]);
        assert_eq!(network.send(0, 1, Payload::Rumour { id: 1 }).unwrap(), Delivery::Partitioned);

        network.set_loss(0, 2, 1.0);
        assert_eq!(network.send(0, 2, Payload::Rumour { id: 1 }).unwrap(), Delivery::Lost);

        assert!(network.send(0, 7, Payload::Rumour { id: 1 }).is_err());

        let stats = network.stats();
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.dropped(), 2);
        assert_eq!(scheduler.pending_tasks(), 0);
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let (scheduler, network, _) = setup(4, 2, 0.0);

        assert_eq!(network.broadcast(1, Payload::Heartbeat { beat: 1 }).unwrap(), 3);
        assert_eq!(scheduler.pending_tasks(), 3);
        assert_eq!(network.stats().max_latency, 2);
    }

    #[test]
    fn test_send_after_end_is_rejected() {
        let (scheduler, network, _) = setup(2, 1, 0.0);

        scheduler.start().unwrap();
        assert!(scheduler.wait_until_ended_timeout(Duration::from_secs(10)));

        let err = network.send(0, 1, Payload::Ping { seq: 0 }).unwrap_err();
        assert!(matches!(err, SimError::SchedulingRejected(_)));
    }
}
