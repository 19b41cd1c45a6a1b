//! Background driver that advances the clock whenever the executor
//! goes quiet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use stepsim_env::{SimError, SimResult};
use tracing::{debug, error, trace};

use super::{Inner, Scheduler};

/// Handle to the step watcher thread.
pub(crate) struct StepWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl StepWatcher {
    /// Starts the watcher for `scheduler`.
    pub(crate) fn spawn(scheduler: Weak<Inner>, poll: Duration) -> SimResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let handle = thread::Builder::new()
            .name("stepsim-step-watcher".to_string())
            .spawn(move || run_loop(scheduler, thread_stop, poll))
            .map_err(|e| {
                error!("Failed to spawn step watcher: {}", e);
                SimError::WorkerSpawn(e.to_string())
            })?;

        Ok(Self {
            stop,
            thread_id: handle.thread().id(),
            handle: Some(handle),
        })
    }

    /// Asks the watcher to exit after its current iteration.
    pub(crate) fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Waits for the watcher thread, unless called from it.
    pub(crate) fn join(&mut self) {
        if thread::current().id() == self.thread_id {
            return;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Step watcher panicked");
            }
        }
    }
}

fn run_loop(scheduler: Weak<Inner>, stop: Arc<AtomicBool>, poll: Duration) {
    debug!("Step watcher started");
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        let Some(scheduler) = Scheduler::upgrade(&scheduler) else {
            break;
        };
        if scheduler.is_killed() {
            break;
        }

        // Bounded wait so a kill is noticed even if a task never returns
        if !scheduler.executor().await_quiescence_timeout(poll) {
            trace!(time = scheduler.current_time(), "Step still busy");
            continue;
        }
        if stop.load(Ordering::Acquire) {
            break;
        }

        scheduler.execute_next_step();
    }
    debug!("Step watcher exited");
}
