//! stepsim Environment Interfaces
//!
//! This crate holds the contracts shared by the engine (`stepsim_core`)
//! and the domain code that runs on it (`stepsim_sim`):
//!
//! - [`Executable`]: the task trait, with an optional [`OwnerKey`]
//! - [`StepContext`]: the explicit simulation handle given to agents
//! - [`SimError`]: the error taxonomy of the engine
//!
//! # Example
//!
//! ```ignore
//! use stepsim_env::{FnTask, OwnerKey, StepContext};
//!
//! fn greet<Ctx: StepContext>(ctx: &Ctx, agent: OwnerKey) {
//!     let task = FnTask::new(|| Ok(())).with_owner(agent).boxed();
//!     ctx.schedule_once(task, 1).unwrap();
//! }
//! ```

mod context;
mod error;
mod task;
mod types;

pub use context::StepContext;
pub use error::{SimError, SimResult};
pub use task::{BoxedTask, Executable, FnTask};
pub use types::{OwnerKey, ScheduleMode};
