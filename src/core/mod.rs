// Public modules
pub mod defaults;
pub mod engine;
pub mod error;
pub mod gettext;
pub mod git;
pub mod providers;
pub mod services;
pub mod specfile;

// Internal modules - not part of public API
pub(crate) mod http;
pub(crate) mod paths;

// Re-export common types for convenience
pub use engine::{
    ActionResolver, CommandRegistry, ExecutionPlan, JobParams, JobSpec, PipelineExecutor,
    RunReport, RunStatus, TaskList, TaskNode,
};
pub use error::{Error, ErrorCode, Result};
