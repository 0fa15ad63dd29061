//! Agent Executor for the agent-runner control plane.
//!
//! Dispatches a claimed Run onto the Workflow Engine (when `run_type` is
//! `workflow` and `options.workflow_name` names a registered workflow) or
//! the simple simulated path otherwise, and drives it to a terminal state
//! (`RUN_COMPLETED`, `RUN_FAILED`, or `RUN_STOPPED`).

pub mod error;
pub mod executor;
pub mod options;

pub use error::ExecutorError;
pub use executor::{AgentExecutor, ExecutorConfig};
pub use options::RunOptions;
