//! The simulation handle passed to agent and protocol code.

use crate::error::SimResult;
use crate::task::BoxedTask;

/// The central interface between domain code and the time-stepped engine.
///
/// Agents receive a shared handle implementing this trait instead of
/// reaching for a global simulation object, so several independent
/// simulations can live in one process.
///
/// # Suspension
///
/// `await_condition*` may only be called from inside a running task. The
/// calling task blocks until the condition is woken; the engine keeps its
/// full execution capacity while it waits.
pub trait StepContext: Send + Sync + 'static {
    /// One-shot rendezvous token produced by this context.
    type Condition: Clone + Send + Sync + 'static;

    /// Returns the current logical time.
    fn current_time(&self) -> u64;

    /// Returns the last logical time at which tasks may run.
    fn max_duration(&self) -> u64;

    /// Schedules `task` to run `waiting_time` steps from now.
    fn schedule_once(&self, task: BoxedTask, waiting_time: u64) -> SimResult<()>;

    /// Runs `task` every `step`, first `waiting_time` steps from now, until
    /// the simulation ends.
    fn schedule_infinitely(&self, task: BoxedTask, waiting_time: u64, step: u64) -> SimResult<()>;

    /// Creates a fresh, unconsumed condition.
    fn generate_condition(&self) -> Self::Condition;

    /// Suspends the calling task until `condition` is woken.
    ///
    /// # Returns
    /// * `Ok(())` - woken normally
    /// * `Err(SimError::ForcedWakeUp)` - interrupted by shutdown
    fn await_condition(&self, condition: &Self::Condition) -> SimResult<()>;

    /// Like [`StepContext::await_condition`], but also resumes once
    /// `timeout` logical steps have passed.
    fn await_condition_timeout(&self, condition: &Self::Condition, timeout: u64) -> SimResult<()>;

    /// Wakes the task suspended on `condition` (no-op once consumed).
    fn wake_up(&self, condition: &Self::Condition);
}
