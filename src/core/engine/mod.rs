//! Task pipeline engine.
//!
//! - `task` - task nodes and the append-only task list
//! - `job` - job documents and seed parameters
//! - `resolver` - command registry and action resolution
//! - `executor` - sequential run with context threading and cleanup
//!
//! Providers live in `crate::providers`; the engine only calls them through
//! the `CapabilityProvider` trait.

pub mod cleanup;
pub mod context;
pub mod executor;
pub mod job;
pub mod log;
pub mod resolver;
pub mod sandbox;
pub mod task;

pub use executor::{PipelineExecutor, RunReport, RunStatus, StepRecord, StepStatus};
pub use job::{JobParams, JobSpec};
pub use resolver::{ActionResolver, CommandRegistry, ExecutionPlan, Resolution};
pub use task::{TaskEntry, TaskList, TaskNode};
