//! Worker threads of the executor pool.
//!
//! A worker repeatedly selects a runnable task under the executor lock,
//! runs it with the lock released, and returns its permit and owner slot.
//! Workers in excess of the pool width (left behind by suspensions that
//! have since resumed) retire as soon as they are back in the loop.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::MutexGuard;
use stepsim_env::{BoxedTask, OwnerKey, SimError, SimResult};
use tracing::{debug, error, trace, warn};

use super::{ExecutorState, Shared};

/// Identifier of a worker thread within its executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId {
    /// Executor the worker belongs to
    pub executor: u64,

    /// Index of the worker within the executor (never reused)
    pub index: usize,
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stepsim-{}-worker-{}", self.executor, self.index)
    }
}

#[derive(Clone, Copy)]
pub(crate) struct WorkerContext {
    pub(crate) id: WorkerId,

    /// Owner key of the task this worker is running, if any
    pub(crate) owner: Option<OwnerKey>,
}

thread_local! {
    /// Set for the whole life of a worker thread.
    static CURRENT_WORKER: Cell<Option<WorkerContext>> = const { Cell::new(None) };
}

/// Returns the calling worker's context if it belongs to `executor`.
pub(crate) fn current_context(executor: u64) -> SimResult<WorkerContext> {
    CURRENT_WORKER
        .with(Cell::get)
        .filter(|ctx| ctx.id.executor == executor)
        .ok_or(SimError::ExecutorContextViolation)
}

fn set_current_owner(owner: Option<OwnerKey>) {
    CURRENT_WORKER.with(|current| {
        if let Some(mut ctx) = current.get() {
            ctx.owner = owner;
            current.set(Some(ctx));
        }
    });
}

/// Spawns one worker thread. The caller holds the executor lock.
pub(crate) fn spawn(shared: &Arc<Shared>, state: &mut ExecutorState) -> SimResult<WorkerId> {
    let id = WorkerId {
        executor: shared.id,
        index: state.next_worker_index,
    };
    let thread_shared = Arc::clone(shared);

    thread::Builder::new()
        .name(id.to_string())
        .spawn(move || run_loop(thread_shared, id))
        .map_err(|e| {
            error!(worker = %id, "Failed to spawn worker: {}", e);
            SimError::WorkerSpawn(e.to_string())
        })?;

    state.next_worker_index += 1;
    state.live_workers += 1;
    trace!(worker = %id, live = state.live_workers, "Worker spawned");
    Ok(id)
}

/// Worker thread main loop.
fn run_loop(shared: Arc<Shared>, id: WorkerId) {
    CURRENT_WORKER.with(|current| current.set(Some(WorkerContext { id, owner: None })));

    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }

        if state.live_workers > shared.width {
            debug!(worker = %id, live = state.live_workers, "Surplus worker retiring");
            break;
        }

        if state.available_permits > 0 {
            if let Some(task) = state.queue.select() {
                state.available_permits -= 1;
                state.running += 1;

                let owner = task.owner_key();
                MutexGuard::unlocked(&mut state, || run_task(id, task));

                state.available_permits += 1;
                state.running -= 1;
                if let Some(owner) = owner {
                    state.queue.finish(owner);
                }
                shared.work_available.notify_all();
                shared.notify_if_quiescent(&state);
                continue;
            }
        }

        shared.work_available.wait(&mut state);
    }

    state.live_workers -= 1;
    // A retiring worker may leave work behind for a sibling
    shared.work_available.notify_all();
    drop(state);

    CURRENT_WORKER.with(|current| current.set(None));
    trace!(worker = %id, "Worker exited");
}

/// Runs one task body, isolating its errors and panics.
fn run_task(worker: WorkerId, mut task: BoxedTask) {
    let owner = task.owner_key();
    set_current_owner(owner);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.execute()));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(worker = %worker, task = task.name(), "{}", SimError::task_failure(e));
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                worker = %worker,
                task = task.name(),
                "{}",
                SimError::task_failure(format!("panicked: {reason}"))
            );
        }
    }

    set_current_owner(None);
    drop(task);
}
