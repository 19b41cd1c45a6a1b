//! Request/reply: each agent pings its successor and waits for the pong.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use stepsim_env::{SimResult, StepContext};
use tracing::debug;

use super::{AgentBehavior, BehaviorReport};
use crate::context::AgentCtx;
use crate::network::{Message, Payload};

/// Sends `rounds` pings one after the other, each awaited for at most
/// `reply_timeout` steps, and answers the pings of its predecessor.
pub struct PingPong<C: StepContext> {
    rounds: u64,
    reply_timeout: u64,
    next_seq: AtomicU64,

    /// Conditions of outstanding requests; whoever removes an entry owns
    /// its outcome (the reply handler or the timed-out waiter).
    pending: Mutex<HashMap<u64, C::Condition>>,

    requests: AtomicU64,
    replies: AtomicU64,
    timeouts: AtomicU64,
    interrupted: AtomicU64,
    answered: AtomicU64,
}

impl<C: StepContext> PingPong<C> {
    pub fn new(rounds: u64, reply_timeout: u64) -> Self {
        Self {
            rounds,
            reply_timeout,
            next_seq: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            requests: AtomicU64::new(0),
            replies: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            interrupted: AtomicU64::new(0),
            answered: AtomicU64::new(0),
        }
    }

    fn successor(ctx: &AgentCtx<C>) -> Option<usize> {
        let peers = ctx.peers();
        peers
            .iter()
            .copied()
            .find(|&peer| peer > ctx.id())
            .or_else(|| peers.first().copied())
    }
}

impl<C: StepContext> AgentBehavior<C> for PingPong<C> {
    fn name(&self) -> &'static str {
        "ping_pong"
    }

    fn on_start(&self, ctx: &AgentCtx<C>) -> SimResult<()> {
        let Some(peer) = Self::successor(ctx) else {
            return Ok(());
        };

        for _ in 0..self.rounds {
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            let condition = ctx.generate_condition();
            self.pending.lock().insert(seq, condition.clone());
            self.requests.fetch_add(1, Ordering::SeqCst);

            if let Err(e) = ctx.send(peer, Payload::Ping { seq }) {
                self.pending.lock().remove(&seq);
                return Err(e);
            }

            match ctx.await_condition_timeout(&condition, self.reply_timeout) {
                Ok(()) => {
                    if self.pending.lock().remove(&seq).is_some() {
                        self.timeouts.fetch_add(1, Ordering::SeqCst);
                        debug!(agent = ctx.id(), peer, seq, time = ctx.now(), "Request timed out");
                    }
                }
                Err(e) if e.is_forced_wake_up() => {
                    self.pending.lock().remove(&seq);
                    self.interrupted.fetch_add(1, Ordering::SeqCst);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn on_message(&self, ctx: &AgentCtx<C>, message: Message) -> SimResult<()> {
        match message.payload {
            Payload::Ping { seq } => {
                self.answered.fetch_add(1, Ordering::SeqCst);
                ctx.send(message.from, Payload::Pong { seq })?;
            }
            Payload::Pong { seq } => {
                let condition = self.pending.lock().remove(&seq);
                match condition {
                    Some(condition) => {
                        self.replies.fetch_add(1, Ordering::SeqCst);
                        ctx.wake_up(&condition);
                    }
                    None => debug!(agent = ctx.id(), seq, "Late reply ignored"),
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn report(&self) -> BehaviorReport {
        BehaviorReport {
            requests: self.requests.load(Ordering::SeqCst),
            replies: self.replies.load(Ordering::SeqCst),
            timeouts: self.timeouts.load(Ordering::SeqCst),
            interrupted: self.interrupted.load(Ordering::SeqCst),
            answered: self.answered.load(Ordering::SeqCst),
            ..Default::default()
        }
    }
}
