//! Self-rescheduling wrapper behind `schedule_repeatedly` and
//! `schedule_infinitely`.

use std::sync::Weak;

use stepsim_env::{BoxedTask, Executable, OwnerKey, SimError, SimResult};
use tracing::{debug, trace};

use super::{Inner, Scheduler};

/// Runs the wrapped task, then schedules itself `step` later while
/// repetitions remain. `remaining == None` repeats until the scheduler
/// refuses the reschedule because it was killed.
pub(crate) struct RepeatingTask {
    task: Option<BoxedTask>,
    remaining: Option<u64>,
    step: u64,
    owner: Option<OwnerKey>,
    name: String,
    scheduler: Weak<Inner>,
}

impl RepeatingTask {
    pub(crate) fn bounded(task: BoxedTask, repetitions: u64, step: u64, scheduler: Weak<Inner>) -> Self {
        Self::new(task, Some(repetitions), step, scheduler)
    }

    pub(crate) fn unbounded(task: BoxedTask, step: u64, scheduler: Weak<Inner>) -> Self {
        Self::new(task, None, step, scheduler)
    }

    fn new(task: BoxedTask, remaining: Option<u64>, step: u64, scheduler: Weak<Inner>) -> Self {
        Self {
            owner: task.owner_key(),
            name: format!("repeat:{}", task.name()),
            task: Some(task),
            remaining,
            step,
            scheduler,
        }
    }
}

impl Executable for RepeatingTask {
    fn execute(&mut self) -> SimResult<()> {
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };

        // The wrapped task's failure does not stop the repetition
        let result = task.execute();

        let remaining = self.remaining.map(|left| left.saturating_sub(1));
        if remaining == Some(0) {
            trace!(task = %self.name, "Last repetition done");
            return result;
        }

        let Some(scheduler) = Scheduler::upgrade(&self.scheduler) else {
            return result;
        };

        let next = RepeatingTask {
            task: Some(task),
            remaining,
            step: self.step,
            owner: self.owner,
            name: self.name.clone(),
            scheduler: self.scheduler.clone(),
        };

        match scheduler.schedule_relative(Box::new(next), self.step) {
            Ok(()) => result,
            Err(SimError::SchedulingRejected(_)) => {
                debug!(task = %self.name, "Repetition stopped: scheduler killed");
                result
            }
            Err(e) => Err(e),
        }
    }

    fn owner_key(&self) -> Option<OwnerKey> {
        self.owner
    }

    fn name(&self) -> &str {
        &self.name
    }
}
