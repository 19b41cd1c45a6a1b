//! Owner-partitioned task queue and the worker selection policy.
//!
//! Pending tasks are bucketed by owner key. The queue also tracks, per
//! owner, whether a task of that owner is running and how many of its
//! tasks are parked on a condition, which is everything selection needs.

use std::collections::{HashMap, VecDeque};

use stepsim_env::{BoxedTask, OwnerKey};

/// Per-owner bookkeeping.
#[derive(Default)]
struct OwnerSlot {
    /// Tasks waiting to run, in submission order
    pending: VecDeque<BoxedTask>,

    /// A task of this owner currently holds a permit
    running: bool,

    /// Tasks of this owner suspended on a condition
    parked: usize,
}

impl OwnerSlot {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && !self.running && self.parked == 0
    }
}

/// Queue of submitted-but-not-started tasks.
#[derive(Default)]
pub(crate) struct TaskQueue {
    owners: HashMap<OwnerKey, OwnerSlot>,
    unconstrained: VecDeque<BoxedTask>,
    len: usize,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends a task to its owner's bucket (or the unconstrained one).
    pub(crate) fn push(&mut self, task: BoxedTask) {
        match task.owner_key() {
            Some(owner) => self.owners.entry(owner).or_default().pending.push_back(task),
            None => self.unconstrained.push_back(task),
        }
        self.len += 1;
    }

    /// Picks the next runnable task and marks its owner as running.
    ///
    /// Order: an owner with nothing running or parked, then the
    /// unconstrained bucket, then an owner whose only holder is parked.
    /// An owner with a running task is never picked.
    pub(crate) fn select(&mut self) -> Option<BoxedTask> {
        let free_owner = self
            .owners
            .iter()
            .find(|(_, slot)| !slot.pending.is_empty() && !slot.running && slot.parked == 0)
            .map(|(owner, _)| *owner);

        if let Some(owner) = free_owner {
            return self.take_from_owner(owner);
        }

        if let Some(task) = self.unconstrained.pop_front() {
            self.len -= 1;
            return Some(task);
        }

        let parked_owner = self
            .owners
            .iter()
            .find(|(_, slot)| !slot.pending.is_empty() && !slot.running)
            .map(|(owner, _)| *owner);

        parked_owner.and_then(|owner| self.take_from_owner(owner))
    }

    fn take_from_owner(&mut self, owner: OwnerKey) -> Option<BoxedTask> {
        let slot = self.owners.get_mut(&owner)?;
        let task = slot.pending.pop_front()?;
        slot.running = true;
        self.len -= 1;
        Some(task)
    }

    /// Releases the owner after its running task returned.
    pub(crate) fn finish(&mut self, owner: OwnerKey) {
        if let Some(slot) = self.owners.get_mut(&owner) {
            slot.running = false;
        }
        self.prune(owner);
    }

    /// Converts the owner's running task into a parked one.
    pub(crate) fn park(&mut self, owner: OwnerKey) {
        let slot = self.owners.entry(owner).or_default();
        slot.running = false;
        slot.parked += 1;
    }

    /// Returns true if a parked task of `owner` may take the owner back.
    pub(crate) fn can_resume(&self, owner: OwnerKey) -> bool {
        self.owners.get(&owner).map_or(true, |slot| !slot.running)
    }

    /// Converts one parked task of `owner` back into the running one.
    pub(crate) fn resume(&mut self, owner: OwnerKey) {
        let slot = self.owners.entry(owner).or_default();
        debug_assert!(!slot.running, "owner {owner} resumed while running");
        slot.parked = slot.parked.saturating_sub(1);
        slot.running = true;
    }

    /// Returns true if a task of `owner` currently holds a permit.
    pub(crate) fn is_running(&self, owner: OwnerKey) -> bool {
        self.owners.get(&owner).is_some_and(|slot| slot.running)
    }

    /// Removes and returns every queued task. Running/parked marks stay.
    pub(crate) fn drain(&mut self) -> Vec<BoxedTask> {
        let mut drained: Vec<BoxedTask> = self.unconstrained.drain(..).collect();
        for slot in self.owners.values_mut() {
            drained.extend(slot.pending.drain(..));
        }
        self.owners.retain(|_, slot| !slot.is_idle());
        self.len = 0;
        drained
    }

    fn prune(&mut self, owner: OwnerKey) {
        if self.owners.get(&owner).is_some_and(OwnerSlot::is_idle) {
            self.owners.remove(&owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepsim_env::FnTask;

    fn owned(owner: OwnerKey, name: &'static str) -> BoxedTask {
        FnTask::new(|| Ok(())).with_owner(owner).named(name).boxed()
    }

    fn free(name: &'static str) -> BoxedTask {
        FnTask::new(|| Ok(())).named(name).boxed()
    }

    #[test]
    fn test_owner_tasks_run_one_at_a_time_in_order() {
        let owner = OwnerKey::from_seed(1);
        let mut queue = TaskQueue::new();
        queue.push(owned(owner, "first"));
        queue.push(owned(owner, "second"));

        let first = queue.select().unwrap();
        assert_eq!(first.name(), "first");
        assert!(queue.is_running(owner));

        // Owner is busy: nothing else is runnable
        assert!(queue.select().is_none());
        assert_eq!(queue.len(), 1);

        queue.finish(owner);
        let second = queue.select().unwrap();
        assert_eq!(second.name(), "second");
    }

    #[test]
    fn test_free_owner_preferred_over_unconstrained() {
        let owner = OwnerKey::from_seed(1);
        let mut queue = TaskQueue::new();
        queue.push(free("loose"));
        queue.push(owned(owner, "owned"));

        assert_eq!(queue.select().unwrap().name(), "owned");
        assert_eq!(queue.select().unwrap().name(), "loose");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_parked_owner_is_liveness_fallback() {
        let parked = OwnerKey::from_seed(1);
        let mut queue = TaskQueue::new();
        queue.push(owned(parked, "holder"));
        let _holder = queue.select().unwrap();
        queue.park(parked);

        queue.push(owned(parked, "reply"));
        queue.push(free("loose"));

        // Unconstrained work first, then the parked owner's bucket
        assert_eq!(queue.select().unwrap().name(), "loose");
        assert_eq!(queue.select().unwrap().name(), "reply");

        // The reply handler now runs: the parked holder cannot resume yet
        assert!(!queue.can_resume(parked));
        queue.finish(parked);
        assert!(queue.can_resume(parked));
        queue.resume(parked);
        assert!(queue.is_running(parked));
    }

    #[test]
    fn test_drain_returns_only_queued_tasks() {
        let a = OwnerKey::from_seed(1);
        let b = OwnerKey::from_seed(2);
        let mut queue = TaskQueue::new();
        queue.push(owned(a, "a1"));
        queue.push(owned(a, "a2"));
        queue.push(owned(b, "b1"));
        queue.push(free("loose"));

        let _running = queue.select().unwrap();
        let drained = queue.drain();

        assert_eq!(drained.len(), 3);
        assert!(queue.is_empty());
        assert!(queue.select().is_none());
    }
}
