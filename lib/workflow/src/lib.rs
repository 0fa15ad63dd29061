//! Workflow Engine for the agent-runner control plane.
//!
//! A [`model::Workflow`] is a fixed, named sequence of [`model::Step`]s
//! registered ahead of time in a [`model::WorkflowRegistry`]. Running one
//! against a Run appends `WORKFLOW_*`/`STEP_*` events to that Run's event
//! log as it goes; see [`engine::execute_workflow`].

pub mod engine;
pub mod error;
pub mod model;
pub mod resolve;

pub use engine::{execute_workflow, EngineConfig, SHELL_OUTPUT_LIMIT_BYTES};
pub use error::{StepError, WorkflowError};
pub use model::{Step, StepType, Workflow, WorkflowRegistry};
pub use resolve::resolve_model;
