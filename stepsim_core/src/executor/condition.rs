//! One-shot rendezvous used to suspend and resume a single running task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};
use stepsim_env::{SimError, SimResult};

use super::Shared;

/// Lifecycle of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionState {
    /// Fresh, nobody waiting
    Created,

    /// Woken before anyone waited; the next await returns at once
    Signalled,

    /// A worker is parked (or about to park) on it
    Armed,

    /// Woken while armed; the parked worker has not observed it yet
    Woken,

    /// Interrupted by executor shutdown while armed
    Interrupted,

    /// Woken exactly once and observed; cannot be reused
    Consumed,
}

/// Result of arming a condition.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ArmOutcome {
    /// The caller must leave the pool and park
    Armed,

    /// A wake-up already arrived; the caller continues without parking
    AlreadySignalled,
}

struct Inner {
    id: u64,
    state: Mutex<ConditionState>,
    cvar: Condvar,
    executor: Weak<Shared>,
}

/// One-shot suspend/resume token created by an executor.
///
/// Cloning yields another handle to the same token. Only the first
/// `wake_up` before consumption has an effect; later calls are no-ops.
#[derive(Clone)]
pub struct Condition {
    inner: Arc<Inner>,
}

impl Condition {
    pub(crate) fn new(executor: Weak<Shared>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self {
            inner: Arc::new(Inner {
                id: COUNTER.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(ConditionState::Created),
                cvar: Condvar::new(),
                executor,
            }),
        }
    }

    /// Unique id of this condition.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConditionState {
        *self.inner.state.lock()
    }

    /// Returns true once the condition has been woken and observed.
    pub fn is_consumed(&self) -> bool {
        self.state() == ConditionState::Consumed
    }

    pub(crate) fn is_bound_to(&self, shared: &Arc<Shared>) -> bool {
        std::ptr::eq(self.inner.executor.as_ptr(), Arc::as_ptr(shared))
    }

    /// Wakes the task waiting on this condition.
    ///
    /// Returns true if this call had an effect.
    pub fn wake_up(&self) -> bool {
        let mut state = self.inner.state.lock();
        match *state {
            ConditionState::Created => {
                *state = ConditionState::Signalled;
                true
            }
            ConditionState::Armed => {
                // The woken task counts as active until it is running again
                self.mark_resuming();
                *state = ConditionState::Woken;
                self.inner.cvar.notify_one();
                true
            }
            _ => false,
        }
    }

    /// Interrupts a parked worker during shutdown.
    pub(crate) fn interrupt(&self) -> bool {
        let mut state = self.inner.state.lock();
        if *state != ConditionState::Armed {
            return false;
        }
        self.mark_resuming();
        *state = ConditionState::Interrupted;
        self.inner.cvar.notify_one();
        true
    }

    /// Binds the condition to the calling worker.
    pub(crate) fn arm(&self) -> SimResult<ArmOutcome> {
        let mut state = self.inner.state.lock();
        match *state {
            ConditionState::Created => {
                *state = ConditionState::Armed;
                Ok(ArmOutcome::Armed)
            }
            ConditionState::Signalled => {
                *state = ConditionState::Consumed;
                Ok(ArmOutcome::AlreadySignalled)
            }
            other => Err(SimError::invalid_state("await condition", format!("{other:?}"))),
        }
    }

    /// Undoes [`Condition::arm`] when the worker could not leave the pool.
    pub(crate) fn disarm(&self) {
        let mut state = self.inner.state.lock();
        match *state {
            ConditionState::Armed => *state = ConditionState::Created,
            ConditionState::Woken | ConditionState::Interrupted => {
                self.unmark_resuming();
                *state = ConditionState::Signalled;
            }
            _ => {}
        }
    }

    /// Blocks the calling thread until woken or interrupted.
    pub(crate) fn park(&self) -> SimResult<()> {
        let mut state = self.inner.state.lock();
        while *state == ConditionState::Armed {
            self.inner.cvar.wait(&mut state);
        }
        let outcome = match *state {
            ConditionState::Interrupted => Err(SimError::ForcedWakeUp),
            _ => Ok(()),
        };
        *state = ConditionState::Consumed;
        outcome
    }

    fn mark_resuming(&self) {
        if let Some(shared) = self.inner.executor.upgrade() {
            shared.state.lock().resuming += 1;
        }
    }

    fn unmark_resuming(&self) {
        if let Some(shared) = self.inner.executor.upgrade() {
            let mut state = shared.state.lock();
            state.resuming = state.resuming.saturating_sub(1);
        }
    }
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn detached() -> Condition {
        Condition::new(Weak::new())
    }

    #[test]
    fn test_wake_before_arm_is_remembered() {
        let cond = detached();
        assert!(cond.wake_up());
        assert!(!cond.wake_up());
        assert_eq!(cond.state(), ConditionState::Signalled);

        assert_eq!(cond.arm().unwrap(), ArmOutcome::AlreadySignalled);
        assert!(cond.is_consumed());
    }

    #[test]
    fn test_consumed_condition_cannot_be_armed() {
        let cond = detached();
        cond.wake_up();
        cond.arm().unwrap();

        assert!(matches!(cond.arm(), Err(SimError::InvalidState { .. })));
        assert!(!cond.wake_up());
    }

    #[test]
    fn test_park_returns_after_single_wake() {
        let cond = detached();
        assert_eq!(cond.arm().unwrap(), ArmOutcome::Armed);

        let waker = cond.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let first = waker.wake_up();
            let second = waker.wake_up();
            (first, second)
        });

        assert!(cond.park().is_ok());
        assert_eq!(handle.join().unwrap(), (true, false));
        assert!(cond.is_consumed());
    }

    #[test]
    fn test_interrupt_surfaces_forced_wake_up() {
        let cond = detached();
        cond.arm().unwrap();
        assert!(cond.interrupt());

        assert_eq!(cond.park(), Err(SimError::ForcedWakeUp));
        assert!(!cond.wake_up());
    }

    #[test]
    fn test_disarm_keeps_pending_wake() {
        let cond = detached();
        cond.arm().unwrap();
        cond.wake_up();
        cond.disarm();

        assert_eq!(cond.state(), ConditionState::Signalled);
    }
}
