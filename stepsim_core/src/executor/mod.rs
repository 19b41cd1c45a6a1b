//! Bounded thread-pool executor with per-owner mutual exclusion.
//!
//! # Architecture
//!
//! ```text
//! execute(task) ──► TaskQueue ──select()──► Worker ──► task.execute()
//!                  (owner buckets)      │     │
//!                                       │     └─ await_condition():
//!                   permits (width) ────┘        spawn replacement,
//!                                                release permit + owner,
//!                                                park on Condition
//! ```
//!
//! All mutable state (queue, owner table, permits, worker counts) lives
//! behind one mutex. Two condition variables hang off it: one wakes idle
//! workers and resuming tasks, the other wakes quiescence waiters.

mod condition;
mod queue;
mod worker;

pub use condition::{Condition, ConditionState};
pub use worker::WorkerId;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use stepsim_env::{BoxedTask, SimError, SimResult};
use tracing::{debug, info};

use condition::ArmOutcome;
use queue::TaskQueue;

/// Snapshot of executor counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Configured maximum of concurrently running tasks
    pub width: usize,

    /// Tasks submitted but not started
    pub queued: usize,

    /// Tasks holding a permit
    pub running: usize,

    /// Tasks suspended on a condition
    pub parked: usize,

    /// Woken tasks waiting to run again
    pub resuming: usize,

    /// Worker threads available to pick up work (parked ones excluded)
    pub live_workers: usize,

    /// Total tasks accepted by `execute`
    pub submitted: u64,
}

pub(crate) struct ExecutorState {
    queue: TaskQueue,
    available_permits: usize,
    running: usize,
    resuming: usize,
    parked: HashMap<u64, Condition>,
    live_workers: usize,
    next_worker_index: usize,
    submitted: u64,
    shutdown: bool,
}

impl ExecutorState {
    fn is_quiescent(&self) -> bool {
        self.queue.is_empty() && self.running == 0 && self.resuming == 0
    }
}

pub(crate) struct Shared {
    id: u64,
    width: usize,
    state: Mutex<ExecutorState>,
    work_available: Condvar,
    quiescent: Condvar,
}

impl Shared {
    fn notify_if_quiescent(&self, state: &ExecutorState) {
        if state.is_quiescent() {
            self.quiescent.notify_all();
        }
    }
}

/// Thread-pool executor used by the scheduler.
///
/// Never runs more than `width` tasks at once, and never two tasks with
/// the same owner key at once. Dropping the executor shuts it down.
pub struct Executor {
    shared: Arc<Shared>,
}

impl Executor {
    /// Creates an executor and starts its worker threads.
    ///
    /// If `max_running_threads` is 0, defaults to the number of CPU cores.
    pub fn new(max_running_threads: usize) -> SimResult<Self> {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let width = if max_running_threads == 0 {
            num_cpus::get()
        } else {
            max_running_threads
        };

        let shared = Arc::new(Shared {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            width,
            state: Mutex::new(ExecutorState {
                queue: TaskQueue::new(),
                available_permits: width,
                running: 0,
                resuming: 0,
                parked: HashMap::new(),
                live_workers: 0,
                next_worker_index: 0,
                submitted: 0,
                shutdown: false,
            }),
            work_available: Condvar::new(),
            quiescent: Condvar::new(),
        });

        {
            let mut state = shared.state.lock();
            for _ in 0..width {
                if let Err(e) = worker::spawn(&shared, &mut state) {
                    state.shutdown = true;
                    shared.work_available.notify_all();
                    return Err(e);
                }
            }
        }

        debug!(executor = shared.id, width, "Executor started");
        Ok(Self { shared })
    }

    /// Maximum number of concurrently running tasks.
    pub fn width(&self) -> usize {
        self.shared.width
    }

    /// Submits a task.
    ///
    /// # Returns
    /// * `Ok(())` - queued; an idle worker has been signalled
    /// * `Err(SimError::SchedulingRejected)` - the executor is shut down
    pub fn execute(&self, task: BoxedTask) -> SimResult<()> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(SimError::rejected(format!(
                "executor is shut down, cannot run '{}'",
                task.name()
            )));
        }

        state.queue.push(task);
        state.submitted += 1;

        // Idle workers and resuming tasks share this signal
        self.shared.work_available.notify_all();
        Ok(())
    }

    /// Stops accepting tasks and returns those that never started.
    ///
    /// Idle workers exit; parked tasks are interrupted (they observe
    /// [`SimError::ForcedWakeUp`]) and are not part of the returned list.
    /// Calling it again returns an empty list.
    pub fn shutdown(&self) -> Vec<BoxedTask> {
        let (leftover, parked) = {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return Vec::new();
            }
            state.shutdown = true;

            let leftover = state.queue.drain();
            let parked: Vec<Condition> = state.parked.values().cloned().collect();

            self.shared.work_available.notify_all();
            self.shared.notify_if_quiescent(&state);
            (leftover, parked)
        };

        let interrupted = parked.iter().filter(|c| c.interrupt()).count();
        info!(
            executor = self.shared.id,
            leftover = leftover.len(),
            interrupted,
            "Executor shut down"
        );
        leftover
    }

    /// Returns true once [`Executor::shutdown`] has been called.
    pub fn is_shutdown(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Returns true if nothing is queued, running or resuming.
    pub fn is_quiescent(&self) -> bool {
        self.shared.state.lock().is_quiescent()
    }

    /// Returns true if quiescent and shut down.
    pub fn is_terminated(&self) -> bool {
        let state = self.shared.state.lock();
        state.shutdown && state.is_quiescent()
    }

    /// Blocks until the executor is quiescent.
    pub fn await_quiescence(&self) -> bool {
        let mut state = self.shared.state.lock();
        while !state.is_quiescent() {
            self.shared.quiescent.wait(&mut state);
        }
        true
    }

    /// Blocks until the executor is quiescent or `timeout` elapses.
    ///
    /// Returns the quiescence state observed last.
    pub fn await_quiescence_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.is_quiescent() {
            if self.shared.quiescent.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.is_quiescent()
    }

    /// Blocks until the executor is terminated or `timeout` elapses.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !(state.shutdown && state.is_quiescent()) {
            if self.shared.quiescent.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.shutdown && state.is_quiescent()
    }

    /// Creates a fresh condition bound to this executor.
    pub fn generate_condition(&self) -> Condition {
        Condition::new(Arc::downgrade(&self.shared))
    }

    /// Returns the id of the calling worker thread.
    ///
    /// Fails with [`SimError::ExecutorContextViolation`] off the pool.
    pub fn current_worker(&self) -> SimResult<WorkerId> {
        worker::current_context(self.shared.id).map(|ctx| ctx.id)
    }

    /// Suspends the calling task until `condition` is woken.
    ///
    /// Must be called from a task running on this executor. A replacement
    /// worker keeps the pool at full strength while the caller is parked.
    /// On resume the caller gets a permit and its owner slot back before
    /// this returns.
    pub fn await_condition(&self, condition: &Condition) -> SimResult<()> {
        let ctx = worker::current_context(self.shared.id)?;
        if !condition.is_bound_to(&self.shared) {
            return Err(SimError::invalid_state(
                "await condition",
                "it belongs to another executor",
            ));
        }

        if condition.arm()? == ArmOutcome::AlreadySignalled {
            return Ok(());
        }

        // Leave the pool
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                drop(state);
                condition.disarm();
                return Err(SimError::ForcedWakeUp);
            }
            if let Err(e) = worker::spawn(&self.shared, &mut state) {
                drop(state);
                condition.disarm();
                return Err(e);
            }

            state.available_permits += 1;
            state.running -= 1;
            state.live_workers -= 1;
            if let Some(owner) = ctx.owner {
                state.queue.park(owner);
            }
            state.parked.insert(condition.id(), condition.clone());

            self.shared.work_available.notify_all();
            self.shared.notify_if_quiescent(&state);
        }

        debug!(worker = %ctx.id, condition = condition.id(), "Task parked");
        let outcome = condition.park();

        // Rejoin: wait for a permit and for the owner to be free
        {
            let mut state = self.shared.state.lock();
            state.parked.remove(&condition.id());
            loop {
                let owner_free = ctx.owner.map_or(true, |owner| state.queue.can_resume(owner));
                if state.available_permits > 0 && owner_free {
                    break;
                }
                self.shared.work_available.wait(&mut state);
            }

            state.available_permits -= 1;
            state.running += 1;
            state.resuming -= 1;
            state.live_workers += 1;
            if let Some(owner) = ctx.owner {
                state.queue.resume(owner);
            }
        }

        debug!(worker = %ctx.id, condition = condition.id(), forced = outcome.is_err(), "Task resumed");
        outcome
    }

    /// Returns a snapshot of the executor counters.
    pub fn stats(&self) -> ExecutorStats {
        let state = self.shared.state.lock();
        ExecutorStats {
            width: self.shared.width,
            queued: state.queue.len(),
            running: state.running,
            parked: state.parked.len(),
            resuming: state.resuming,
            live_workers: state.live_workers,
            submitted: state.submitted,
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        let leftover = self.shutdown();
        if !leftover.is_empty() {
            debug!(executor = self.shared.id, dropped = leftover.len(), "Dropped queued tasks");
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("id", &self.shared.id)
            .field("stats", &self.stats())
            .finish()
    }
}
