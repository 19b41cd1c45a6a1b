//! stepsim Core - time-stepped scheduler and concurrent executor
//!
//! This crate advances a logical clock in discrete steps and, at each step,
//! runs every task due at that time on a bounded thread pool:
//!
//! 1. **Executor**: at most `width` tasks run at once; tasks sharing an
//!    owner key never overlap; a running task may suspend on a
//!    [`Condition`] without starving the pool.
//! 2. **Scheduler**: buckets tasks by due time and only moves the clock
//!    once the executor has gone quiet, so every step completes before
//!    the next one starts.
//!
//! # Usage
//!
//! ```ignore
//! use stepsim_core::{Scheduler, SchedulerConfig};
//! use stepsim_env::FnTask;
//!
//! let scheduler = Scheduler::new(SchedulerConfig::new(10).with_threads(4))?;
//! scheduler.schedule_repeatedly(FnTask::new(|| Ok(())).boxed(), 1, 3, 2)?;
//! scheduler.start()?;
//! scheduler.wait_until_ended();
//! ```

pub mod config;
pub mod executor;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use executor::{Condition, ConditionState, Executor, ExecutorStats, WorkerId};
pub use scheduler::{ObserverId, Scheduler, SchedulerObserver, SchedulerState, StepOutcome};
