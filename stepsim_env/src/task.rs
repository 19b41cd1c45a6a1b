//! The unit of work run by the executor.

use crate::error::SimResult;
use crate::types::OwnerKey;

/// A schedulable unit of domain work.
///
/// A task is submitted once and is finished after `execute` returns,
/// whatever the result. Errors and panics raised by `execute` are caught
/// and logged by the worker that ran it; they never reach sibling tasks.
pub trait Executable: Send + 'static {
    /// Runs the task body.
    fn execute(&mut self) -> SimResult<()>;

    /// Mutual-exclusion domain of this task. `None` means unconstrained.
    fn owner_key(&self) -> Option<OwnerKey> {
        None
    }

    /// Short label used in logs.
    fn name(&self) -> &str {
        "task"
    }
}

/// Owned, type-erased task as stored in queues and buckets.
pub type BoxedTask = Box<dyn Executable>;

impl std::fmt::Debug for dyn Executable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executable")
            .field("name", &self.name())
            .field("owner_key", &self.owner_key())
            .finish()
    }
}

/// Adapts a closure into an [`Executable`].
///
/// ```ignore
/// let task = FnTask::new(|| Ok(())).with_owner(agent_key).named("deliver");
/// scheduler.schedule_once(task.boxed(), 1)?;
/// ```
pub struct FnTask<F> {
    body: F,
    owner: Option<OwnerKey>,
    name: &'static str,
}

impl<F> FnTask<F>
where
    F: FnMut() -> SimResult<()> + Send + 'static,
{
    /// Creates an unconstrained task from a closure.
    pub fn new(body: F) -> Self {
        Self {
            body,
            owner: None,
            name: "fn-task",
        }
    }

    /// Binds the task to an owner key.
    pub fn with_owner(mut self, owner: OwnerKey) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Sets the log label.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Boxes the task for submission.
    pub fn boxed(self) -> BoxedTask {
        Box::new(self)
    }
}

impl<F> Executable for FnTask<F>
where
    F: FnMut() -> SimResult<()> + Send + 'static,
{
    fn execute(&mut self) -> SimResult<()> {
        (self.body)()
    }

    fn owner_key(&self) -> Option<OwnerKey> {
        self.owner
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;

    #[test]
    fn test_fn_task_runs_body() {
        let mut count = 0;
        let mut task = FnTask::new(move || {
            count += 1;
            if count > 1 {
                return Err(SimError::task_failure("ran twice"));
            }
            Ok(())
        });

        assert!(task.execute().is_ok());
        assert!(task.execute().is_err());
    }

    #[test]
    fn test_fn_task_owner_and_name() {
        let key = OwnerKey::from_seed(3);
        let task = FnTask::new(|| Ok(())).with_owner(key).named("deliver").boxed();

        assert_eq!(task.owner_key(), Some(key));
        assert_eq!(task.name(), "deliver");
    }
}
