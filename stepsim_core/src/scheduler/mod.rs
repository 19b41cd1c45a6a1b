//! Time-stepped scheduler.
//!
//! The scheduler owns the logical clock and a time → tasks map. Each step
//! submits the earliest bucket to the [`Executor`]; the step watcher waits
//! for the executor to go quiet before taking the next step, so the clock
//! only moves once every task of the current step has finished.
//!
//! ```text
//!  schedule_*() ──► buckets: BTreeMap<time, Vec<task>>
//!                          │ execute_next_step()
//!                          ▼
//!                      Executor ──quiescent──► StepWatcher ──┐
//!                          ▲                                 │
//!                          └──────── next step ──────────────┘
//! ```

mod observer;
mod repeat;
mod watcher;

pub use observer::{ObserverId, SchedulerObserver};

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use stepsim_env::{BoxedTask, FnTask, ScheduleMode, SimError, SimResult, StepContext};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::executor::{Condition, Executor};
use observer::{LifecycleEvent, ObserverRegistry};
use repeat::RepeatingTask;
use watcher::StepWatcher;

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Created,
    Started,
    Killed,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SchedulerState::Created => "CREATED",
            SchedulerState::Started => "STARTED",
            SchedulerState::Killed => "KILLED",
        };
        f.write_str(name)
    }
}

/// What a single call to `execute_next_step` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The clock moved to `time` and `tasks` tasks were submitted
    Advanced { time: u64, tasks: usize },

    /// The earliest pending time lies past `max_duration`; the run ended
    ReachedEnd { next_time: u64 },

    /// Nothing was pending; the run ended
    NoMoreWork,

    /// The scheduler was not running
    Idle,
}

struct Core {
    lifecycle: SchedulerState,
    current_time: u64,
    buckets: BTreeMap<u64, Vec<BoxedTask>>,
    pending: usize,
    steps: u64,

    /// Set once `kill` has run to completion
    finished: bool,
}

pub(crate) struct Inner {
    config: SchedulerConfig,
    executor: Executor,
    core: Mutex<Core>,
    finished: Condvar,
    observers: ObserverRegistry,
    watcher: Mutex<Option<StepWatcher>>,
}

/// Discrete-time scheduler driving an [`Executor`].
///
/// Cloning gives another handle to the same scheduler; tasks capture a
/// clone to reschedule themselves or to suspend.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Creates a scheduler and its executor pool. The clock starts at 0.
    pub fn new(config: SchedulerConfig) -> SimResult<Self> {
        let executor = Executor::new(config.max_running_threads)?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                executor,
                core: Mutex::new(Core {
                    lifecycle: SchedulerState::Created,
                    current_time: 0,
                    buckets: BTreeMap::new(),
                    pending: 0,
                    steps: 0,
                    finished: false,
                }),
                finished: Condvar::new(),
                observers: ObserverRegistry::default(),
                watcher: Mutex::new(None),
            }),
        })
    }

    pub(crate) fn upgrade(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    /// The executor running this scheduler's tasks.
    pub fn executor(&self) -> &Executor {
        &self.inner.executor
    }

    /// The configuration this scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Starts the run: takes the first step on the calling thread, then
    /// hands over to the step watcher.
    pub fn start(&self) -> SimResult<()> {
        {
            let mut core = self.inner.core.lock();
            if core.lifecycle != SchedulerState::Created {
                return Err(SimError::invalid_state("start", core.lifecycle));
            }
            core.lifecycle = SchedulerState::Started;
        }

        info!(
            max_duration = self.inner.config.max_duration,
            threads = self.inner.executor.width(),
            pending = self.pending_tasks(),
            "Scheduler started"
        );
        self.inner.observers.notify(self, LifecycleEvent::Started);

        self.execute_next_step();
        if self.is_killed() {
            return Ok(());
        }

        let mut watcher = self.inner.watcher.lock();
        match StepWatcher::spawn(self.downgrade(), self.inner.config.watcher_poll) {
            Ok(spawned) => {
                *watcher = Some(spawned);
                Ok(())
            }
            Err(e) => {
                drop(watcher);
                let _ = self.kill();
                Err(e)
            }
        }
    }

    /// Ends the run: stops the watcher, shuts the executor down and drops
    /// every pending task. Queued work is reported, never retried.
    pub fn kill(&self) -> SimResult<()> {
        let (dropped, time) = {
            let mut core = self.inner.core.lock();
            if core.lifecycle != SchedulerState::Started {
                return Err(SimError::invalid_state("kill", core.lifecycle));
            }
            core.lifecycle = SchedulerState::Killed;
            core.pending = 0;
            (std::mem::take(&mut core.buckets), core.current_time)
        };
        let dropped: usize = dropped.into_values().map(|bucket| bucket.len()).sum();

        let watcher = self.inner.watcher.lock().take();
        if let Some(watcher) = &watcher {
            watcher.stop();
        }

        let leftover = self.inner.executor.shutdown();
        info!(
            time,
            dropped_pending = dropped,
            dropped_queued = leftover.len(),
            "Scheduler killed"
        );
        drop(leftover);

        if let Some(mut watcher) = watcher {
            watcher.join();
        }

        self.inner.observers.notify(self, LifecycleEvent::Killed);

        let mut core = self.inner.core.lock();
        core.finished = true;
        self.inner.finished.notify_all();
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.inner.core.lock().lifecycle
    }

    /// Returns true between `start` and `kill`.
    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Started
    }

    /// Returns true once killed.
    pub fn is_killed(&self) -> bool {
        self.state() == SchedulerState::Killed
    }

    /// Returns true if killed or if the clock is past `max_duration`.
    pub fn is_ended(&self) -> bool {
        let core = self.inner.core.lock();
        core.lifecycle == SchedulerState::Killed || core.current_time > self.inner.config.max_duration
    }

    /// Blocks until `kill` has completed.
    pub fn wait_until_ended(&self) {
        let mut core = self.inner.core.lock();
        while !core.finished {
            self.inner.finished.wait(&mut core);
        }
    }

    /// Blocks until `kill` has completed or `timeout` elapses.
    pub fn wait_until_ended_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut core = self.inner.core.lock();
        while !core.finished {
            if self.inner.finished.wait_until(&mut core, deadline).timed_out() {
                break;
            }
        }
        core.finished
    }

    // ------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------

    /// Current logical time.
    pub fn current_time(&self) -> u64 {
        self.inner.core.lock().current_time
    }

    /// Last logical time at which tasks may run.
    pub fn max_duration(&self) -> u64 {
        self.inner.config.max_duration
    }

    /// Number of tasks waiting in future buckets.
    pub fn pending_tasks(&self) -> usize {
        self.inner.core.lock().pending
    }

    /// Number of steps taken so far.
    pub fn steps(&self) -> u64 {
        self.inner.core.lock().steps
    }

    /// Takes one step: submits the earliest bucket, or ends the run if
    /// there is none or it lies past `max_duration`.
    pub(crate) fn execute_next_step(&self) -> StepOutcome {
        let mut core = self.inner.core.lock();
        if core.lifecycle != SchedulerState::Started {
            return StepOutcome::Idle;
        }

        let next_time = core.buckets.first_key_value().map(|(time, _)| *time);
        let outcome = match next_time {
            None => StepOutcome::NoMoreWork,
            Some(time) if time > self.inner.config.max_duration => {
                StepOutcome::ReachedEnd { next_time: time }
            }
            Some(_) => {
                let Some((time, tasks)) = core.buckets.pop_first() else {
                    return StepOutcome::Idle;
                };
                core.current_time = time;
                core.pending -= tasks.len();
                core.steps += 1;

                // Submitted under the lock: no task can be added to this
                // step once the clock has moved
                let count = tasks.len();
                for task in tasks {
                    if let Err(e) = self.inner.executor.execute(task) {
                        warn!(time, "Step submission stopped: {}", e);
                        break;
                    }
                }
                debug!(time, tasks = count, "Step");
                return StepOutcome::Advanced { time, tasks: count };
            }
        };
        drop(core);

        match outcome {
            StepOutcome::NoMoreWork => {
                info!(time = self.current_time(), "No more work");
                self.inner.observers.notify(self, LifecycleEvent::NoMoreWork);
            }
            StepOutcome::ReachedEnd { next_time } => {
                info!(
                    time = self.current_time(),
                    next_time,
                    max_duration = self.inner.config.max_duration,
                    "Reached end of simulation"
                );
                self.inner.observers.notify(self, LifecycleEvent::ReachedEnd);
            }
            _ => {}
        }

        // Ending the run is the normal way out; a concurrent kill may
        // already have done it
        if let Err(e) = self.kill() {
            debug!("End-of-run kill skipped: {}", e);
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Schedules `task` at absolute time `time` (strictly in the future).
    pub fn schedule_at_time(&self, task: BoxedTask, time: u64) -> SimResult<()> {
        let mut core = self.inner.core.lock();
        Self::check_accepting(&core, &task)?;
        if time <= core.current_time {
            return Err(SimError::invalid_parameter(format!(
                "time {} is not after the current time {}",
                time, core.current_time
            )));
        }
        Self::insert(&mut core, task, time);
        Ok(())
    }

    /// Schedules `task` `waiting_time` steps after the current time.
    pub(crate) fn schedule_relative(&self, task: BoxedTask, waiting_time: u64) -> SimResult<()> {
        check_positive("waiting_time", waiting_time)?;
        let mut core = self.inner.core.lock();
        Self::check_accepting(&core, &task)?;
        let time = core.current_time.checked_add(waiting_time).ok_or_else(|| {
            SimError::invalid_parameter(format!("waiting_time {waiting_time} overflows the clock"))
        })?;
        Self::insert(&mut core, task, time);
        Ok(())
    }

    /// General scheduling entry point.
    ///
    /// * `Once` - runs at `now + waiting_time`
    /// * `Repeatedly` - runs `repetitions` times, `step` apart
    /// * `Infinitely` - runs every `step` until the scheduler is killed
    ///
    /// All numeric parameters must be at least 1.
    pub fn schedule_executable(
        &self,
        task: BoxedTask,
        waiting_time: u64,
        mode: ScheduleMode,
        repetitions: u64,
        step: u64,
    ) -> SimResult<()> {
        check_positive("waiting_time", waiting_time)?;
        check_positive("repetitions", repetitions)?;
        check_positive("step", step)?;

        let task: BoxedTask = match mode {
            ScheduleMode::Once => task,
            ScheduleMode::Repeatedly => {
                Box::new(RepeatingTask::bounded(task, repetitions, step, self.downgrade()))
            }
            ScheduleMode::Infinitely => Box::new(RepeatingTask::unbounded(task, step, self.downgrade())),
        };
        self.schedule_relative(task, waiting_time)
    }

    /// Runs `task` once, `waiting_time` steps from now.
    pub fn schedule_once(&self, task: BoxedTask, waiting_time: u64) -> SimResult<()> {
        self.schedule_executable(task, waiting_time, ScheduleMode::Once, 1, 1)
    }

    /// Runs `task` `repetitions` times, first at `now + waiting_time`,
    /// then every `step`.
    pub fn schedule_repeatedly(
        &self,
        task: BoxedTask,
        waiting_time: u64,
        repetitions: u64,
        step: u64,
    ) -> SimResult<()> {
        self.schedule_executable(task, waiting_time, ScheduleMode::Repeatedly, repetitions, step)
    }

    /// Runs `task` every `step`, first at `now + waiting_time`, until the
    /// scheduler is killed.
    pub fn schedule_infinitely(&self, task: BoxedTask, waiting_time: u64, step: u64) -> SimResult<()> {
        self.schedule_executable(task, waiting_time, ScheduleMode::Infinitely, 1, step)
    }

    fn check_accepting(core: &Core, task: &BoxedTask) -> SimResult<()> {
        if core.lifecycle == SchedulerState::Killed {
            return Err(SimError::rejected(format!(
                "scheduler is killed, cannot schedule '{}'",
                task.name()
            )));
        }
        Ok(())
    }

    fn insert(core: &mut Core, task: BoxedTask, time: u64) {
        core.buckets.entry(time).or_default().push(task);
        core.pending += 1;
    }

    // ------------------------------------------------------------------
    // Suspension
    // ------------------------------------------------------------------

    /// Creates a fresh condition.
    pub fn generate_condition(&self) -> Condition {
        self.inner.executor.generate_condition()
    }

    /// Suspends the calling task until `condition` is woken.
    pub fn await_condition(&self, condition: &Condition) -> SimResult<()> {
        self.inner.executor.await_condition(condition)
    }

    /// Suspends the calling task until `condition` is woken or `timeout`
    /// steps have passed, whichever comes first.
    pub fn await_condition_timeout(&self, condition: &Condition, timeout: u64) -> SimResult<()> {
        check_positive("timeout", timeout)?;
        self.inner.executor.current_worker()?;

        let waker = condition.clone();
        let wake_task = FnTask::new(move || {
            waker.wake_up();
            Ok(())
        })
        .named("condition-timeout");
        self.schedule_relative(wake_task.boxed(), timeout)?;

        self.inner.executor.await_condition(condition)
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Registers a lifecycle observer.
    pub fn add_observer(&self, observer: Arc<dyn SchedulerObserver>) -> ObserverId {
        self.inner.observers.add(observer)
    }

    /// Unregisters an observer. Returns false if it was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.remove(id)
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }
}

fn check_positive(name: &str, value: u64) -> SimResult<()> {
    if value == 0 {
        return Err(SimError::invalid_parameter(format!("{name} must be >= 1, got 0")));
    }
    Ok(())
}

impl StepContext for Scheduler {
    type Condition = Condition;

    fn current_time(&self) -> u64 {
        Scheduler::current_time(self)
    }

    fn max_duration(&self) -> u64 {
        Scheduler::max_duration(self)
    }

    fn schedule_once(&self, task: BoxedTask, waiting_time: u64) -> SimResult<()> {
        Scheduler::schedule_once(self, task, waiting_time)
    }

    fn schedule_infinitely(&self, task: BoxedTask, waiting_time: u64, step: u64) -> SimResult<()> {
        Scheduler::schedule_infinitely(self, task, waiting_time, step)
    }

    fn generate_condition(&self) -> Condition {
        Scheduler::generate_condition(self)
    }

    fn await_condition(&self, condition: &Condition) -> SimResult<()> {
        Scheduler::await_condition(self, condition)
    }

    fn await_condition_timeout(&self, condition: &Condition, timeout: u64) -> SimResult<()> {
        Scheduler::await_condition_timeout(self, condition, timeout)
    }

    fn wake_up(&self, condition: &Condition) {
        condition.wake_up();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.inner.core.lock();
        f.debug_struct("Scheduler")
            .field("state", &core.lifecycle)
            .field("current_time", &core.current_time)
            .field("pending", &core.pending)
            .field("max_duration", &self.inner.config.max_duration)
            .finish()
    }
}

#[cfg(test)]
mod tests;
