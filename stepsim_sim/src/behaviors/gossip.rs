//! Rumour flooding from agent 0.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use stepsim_env::{SimResult, StepContext};
use tracing::debug;

use super::{AgentBehavior, BehaviorReport};
use crate::context::AgentCtx;
use crate::network::{Message, Payload};

/// The originator broadcasts a rumour at start; every agent forwards the
/// first copy it receives to all peers except the sender.
pub struct Gossip {
    originator: bool,
    informed: AtomicBool,
    forwarded: AtomicU64,
}

impl Gossip {
    pub fn new(originator: bool) -> Self {
        Self {
            originator,
            informed: AtomicBool::new(false),
            forwarded: AtomicU64::new(0),
        }
    }
}

impl<C: StepContext> AgentBehavior<C> for Gossip {
    fn name(&self) -> &'static str {
        "gossip"
    }

    fn on_start(&self, ctx: &AgentCtx<C>) -> SimResult<()> {
        if !self.originator {
            return Ok(());
        }
        self.informed.store(true, Ordering::SeqCst);
        let sent = ctx.broadcast(Payload::Rumour { id: ctx.id() as u64 })?;
        self.forwarded.fetch_add(sent as u64, Ordering::SeqCst);
        Ok(())
    }

    fn on_message(&self, ctx: &AgentCtx<C>, message: Message) -> SimResult<()> {
        let Payload::Rumour { .. } = message.payload else {
            return Ok(());
        };
        if self.informed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        debug!(agent = ctx.id(), from = message.from, time = ctx.now(), "Rumour received");
        for peer in ctx.peers() {
            if peer == message.from {
                continue;
            }
            ctx.send(peer, message.payload)?;
            self.forwarded.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn report(&self) -> BehaviorReport {
        BehaviorReport {
            informed: self.informed.load(Ordering::SeqCst),
            forwarded: self.forwarded.load(Ordering::SeqCst),
            ..Default::default()
        }
    }
}
