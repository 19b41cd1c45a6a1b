//! A simulated agent: a behavior bound to its context.

use std::sync::Arc;

use stepsim_env::{OwnerKey, SimResult, StepContext};

use crate::behaviors::{AgentBehavior, BehaviorReport};
use crate::context::AgentCtx;
use crate::network::{AgentId, Message};

/// One agent of a simulated world.
///
/// All entry points run inside tasks owned by [`SimAgent::owner_key`], and
/// each of them passes through the agent's [`crate::ExclusionProbe`].
pub struct SimAgent<C: StepContext> {
    ctx: AgentCtx<C>,
    behavior: Arc<dyn AgentBehavior<C>>,
}

impl<C: StepContext> SimAgent<C> {
    pub fn new(ctx: AgentCtx<C>, behavior: Arc<dyn AgentBehavior<C>>) -> Self {
        Self { ctx, behavior }
    }

    pub fn id(&self) -> AgentId {
        self.ctx.id()
    }

    pub fn owner_key(&self) -> OwnerKey {
        self.ctx.key()
    }

    pub fn ctx(&self) -> &AgentCtx<C> {
        &self.ctx
    }

    pub fn behavior_name(&self) -> &'static str {
        self.behavior.name()
    }

    pub fn report(&self) -> BehaviorReport {
        self.behavior.report()
    }

    /// Runs the behavior's start hook.
    pub fn start(&self) -> SimResult<()> {
        self.guarded(|behavior, ctx| behavior.on_start(ctx))
    }

    /// Hands an incoming message to the behavior.
    pub fn receive(&self, message: Message) -> SimResult<()> {
        self.guarded(|behavior, ctx| behavior.on_message(ctx, message))
    }

    pub fn on_timer(&self) -> SimResult<()> {
        self.guarded(|behavior, ctx| behavior.on_timer(ctx))
    }

    fn guarded<F>(&self, f: F) -> SimResult<()>
    where
        F: FnOnce(&dyn AgentBehavior<C>, &AgentCtx<C>) -> SimResult<()>,
    {
        let _entered = self.ctx.probe().scoped(self.id());
        f(self.behavior.as_ref(), &self.ctx)
    }
}

impl<C: StepContext> std::fmt::Debug for SimAgent<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimAgent")
            .field("id", &self.id())
            .field("owner_key", &self.owner_key())
            .field("behavior", &self.behavior.name())
            .finish()
    }
}
