//! Lifecycle observers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::Scheduler;

/// Receives scheduler lifecycle notifications.
///
/// All methods default to no-ops. They are called on whichever thread
/// caused the transition (the caller of `start`/`kill` or the step
/// watcher), never while scheduler locks are held.
pub trait SchedulerObserver: Send + Sync {
    /// The scheduler left `Created`.
    fn on_started(&self, _scheduler: &Scheduler) {}

    /// The scheduler was killed (explicitly or at the end of the run).
    fn on_killed(&self, _scheduler: &Scheduler) {}

    /// The earliest pending task lies past `max_duration`.
    fn on_reached_end(&self, _scheduler: &Scheduler) {}

    /// No task is pending anywhere.
    fn on_no_more_work(&self, _scheduler: &Scheduler) {}
}

/// Handle returned by observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Lifecycle event kinds, used to dispatch to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecycleEvent {
    Started,
    Killed,
    ReachedEnd,
    NoMoreWork,
}

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    observers: RwLock<Vec<(ObserverId, Arc<dyn SchedulerObserver>)>>,
}

impl ObserverRegistry {
    pub(crate) fn add(&self, observer: Arc<dyn SchedulerObserver>) -> ObserverId {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let id = ObserverId(COUNTER.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub(crate) fn notify(&self, scheduler: &Scheduler, event: LifecycleEvent) {
        // Snapshot so observers may (un)register from inside a callback
        let observers: Vec<_> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            match event {
                LifecycleEvent::Started => observer.on_started(scheduler),
                LifecycleEvent::Killed => observer.on_killed(scheduler),
                LifecycleEvent::ReachedEnd => observer.on_reached_end(scheduler),
                LifecycleEvent::NoMoreWork => observer.on_no_more_work(scheduler),
            }
        }
    }
}
