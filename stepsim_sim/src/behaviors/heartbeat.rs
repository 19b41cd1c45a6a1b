//! Periodic liveness beacons.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use stepsim_env::{SimResult, StepContext};

use super::{AgentBehavior, BehaviorReport};
use crate::context::AgentCtx;
use crate::network::{AgentId, Message, Payload};

/// Broadcasts a heartbeat every `period` steps until the run ends and
/// tracks the last beat heard from each peer.
pub struct Heartbeat {
    period: u64,
    beats_sent: AtomicU64,
    beats_received: AtomicU64,
    last_heard: Mutex<HashMap<AgentId, u64>>,
}

impl Heartbeat {
    pub fn new(period: u64) -> Self {
        Self {
            period,
            beats_sent: AtomicU64::new(0),
            beats_received: AtomicU64::new(0),
            last_heard: Mutex::new(HashMap::new()),
        }
    }

    /// Last beat number heard from `peer`.
    pub fn last_heard(&self, peer: AgentId) -> Option<u64> {
        self.last_heard.lock().get(&peer).copied()
    }
}

impl<C: StepContext> AgentBehavior<C> for Heartbeat {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn on_start(&self, ctx: &AgentCtx<C>) -> SimResult<()> {
        ctx.start_timer(self.period)
    }

    fn on_timer(&self, ctx: &AgentCtx<C>) -> SimResult<()> {
        let beat = self.beats_sent.fetch_add(1, Ordering::SeqCst) + 1;
        ctx.broadcast(Payload::Heartbeat { beat })?;
        Ok(())
    }

    fn on_message(&self, _ctx: &AgentCtx<C>, message: Message) -> SimResult<()> {
        if let Payload::Heartbeat { beat } = message.payload {
            self.beats_received.fetch_add(1, Ordering::SeqCst);
            let mut last_heard = self.last_heard.lock();
            let last = last_heard.entry(message.from).or_insert(0);
            *last = (*last).max(beat);
        }
        Ok(())
    }

    fn report(&self) -> BehaviorReport {
        BehaviorReport {
            beats_sent: self.beats_sent.load(Ordering::SeqCst),
            beats_received: self.beats_received.load(Ordering::SeqCst),
            peers_heard: self.last_heard.lock().len(),
            ..Default::default()
        }
    }
}
