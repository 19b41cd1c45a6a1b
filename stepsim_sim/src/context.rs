//! The handle an agent behavior uses to act on the simulation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use stepsim_env::{FnTask, OwnerKey, SimError, SimResult, StepContext};
use tracing::warn;

use crate::network::{AgentId, Delivery, Payload, SimNetwork};

/// Detects two tasks of one agent running at the same time.
///
/// A task enters on start and leaves when it finishes or suspends.
#[derive(Debug, Default)]
pub struct ExclusionProbe {
    busy: AtomicBool,
    entries: AtomicU64,
    overlaps: AtomicU64,
}

impl ExclusionProbe {
    pub fn enter(&self, agent: AgentId) {
        self.entries.fetch_add(1, Ordering::SeqCst);
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
            warn!(agent, "Agent is handling two events at once");
        }
    }

    pub fn leave(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }

    /// Enters and leaves again when the guard drops, even on panic.
    pub fn scoped(&self, agent: AgentId) -> ProbeGuard<'_> {
        self.enter(agent);
        ProbeGuard(self)
    }

    /// Tasks that entered so far (resumptions included).
    pub fn entries(&self) -> u64 {
        self.entries.load(Ordering::SeqCst)
    }

    pub fn overlaps(&self) -> u64 {
        self.overlaps.load(Ordering::SeqCst)
    }
}

pub struct ProbeGuard<'a>(&'a ExclusionProbe);

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.0.leave();
    }
}

/// Per-agent view of the simulation, generic over the engine handle.
pub struct AgentCtx<C: StepContext> {
    id: AgentId,
    key: OwnerKey,
    context: Arc<C>,
    network: Weak<SimNetwork<C>>,
    probe: Arc<ExclusionProbe>,
}

impl<C: StepContext> Clone for AgentCtx<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            key: self.key,
            context: self.context.clone(),
            network: self.network.clone(),
            probe: self.probe.clone(),
        }
    }
}

impl<C: StepContext> AgentCtx<C> {
    pub fn new(id: AgentId, key: OwnerKey, context: Arc<C>, network: Weak<SimNetwork<C>>) -> Self {
        Self {
            id,
            key,
            context,
            network,
            probe: Arc::new(ExclusionProbe::default()),
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn key(&self) -> OwnerKey {
        self.key
    }

    /// Current logical time.
    pub fn now(&self) -> u64 {
        self.context.current_time()
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn probe(&self) -> &ExclusionProbe {
        &self.probe
    }

    fn network(&self) -> SimResult<Arc<SimNetwork<C>>> {
        self.network
            .upgrade()
            .ok_or_else(|| SimError::rejected("network has been dropped"))
    }

    /// Every other agent, in ascending order.
    pub fn peers(&self) -> Vec<AgentId> {
        self.network
            .upgrade()
            .map(|network| network.agent_ids().into_iter().filter(|&id| id != self.id).collect())
            .unwrap_or_default()
    }

    pub fn send(&self, to: AgentId, payload: Payload) -> SimResult<Delivery> {
        self.network()?.send(self.id, to, payload)
    }

    /// Sends to every peer; returns the number of deliveries scheduled.
    pub fn broadcast(&self, payload: Payload) -> SimResult<usize> {
        self.network()?.broadcast(self.id, payload)
    }

    pub fn generate_condition(&self) -> C::Condition {
        self.context.generate_condition()
    }

    /// Suspends the calling task until `condition` is woken or `timeout`
    /// steps have passed.
    pub fn await_condition_timeout(&self, condition: &C::Condition, timeout: u64) -> SimResult<()> {
        self.probe.leave();
        let outcome = self.context.await_condition_timeout(condition, timeout);
        self.probe.enter(self.id);
        outcome
    }

    /// Suspends the calling task until `condition` is woken.
    pub fn await_condition(&self, condition: &C::Condition) -> SimResult<()> {
        self.probe.leave();
        let outcome = self.context.await_condition(condition);
        self.probe.enter(self.id);
        outcome
    }

    pub fn wake_up(&self, condition: &C::Condition) {
        self.context.wake_up(condition);
    }

    /// Fires this agent's `on_timer` every `period` steps until the run ends.
    pub fn start_timer(&self, period: u64) -> SimResult<()> {
        let network = self.network.clone();
        let id = self.id;
        let task = FnTask::new(move || match network.upgrade().and_then(|n| n.agent(id)) {
            Some(agent) => agent.on_timer(),
            None => Err(SimError::rejected(format!("agent {id} is gone"))),
        })
        .with_owner(self.key)
        .named("timer");

        self.context.schedule_infinitely(task.boxed(), period, period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_detects_overlap() {
        let probe = ExclusionProbe::default();

        probe.enter(0);
        probe.leave();
        probe.enter(0);
        assert_eq!(probe.overlaps(), 0);

        probe.enter(0);
        assert_eq!(probe.overlaps(), 1);
        assert_eq!(probe.entries(), 3);
    }

    #[test]
    fn test_scoped_probe_leaves_on_panic() {
        let probe = ExclusionProbe::default();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = probe.scoped(1);
            panic!("behavior bug");
        }));
        assert!(result.is_err());

        let _guard = probe.scoped(1);
        assert_eq!(probe.overlaps(), 0);
    }
}
