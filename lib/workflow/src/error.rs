//! Error types for the workflow crate.

use std::fmt;

/// Errors from a single step's execution.
#[derive(Debug, Clone, PartialEq)]
pub enum StepError {
    /// A shell step exited with a non-zero status.
    ShellFailed { exit_code: Option<i32>, stderr_tail: String },
    /// A shell step could not even be spawned.
    ShellSpawnFailed { reason: String },
    /// A file-write step's path escaped the workspace directory.
    BadPath { path: String },
    /// A file-write step failed at the filesystem layer.
    WriteFailed { path: String, reason: String },
    /// The step's underlying LLM call failed.
    LlmFailed { reason: String },
    /// The step exceeded its timeout.
    Timeout { elapsed_secs: f64 },
    /// The step was cancelled before completing.
    Cancelled { elapsed_secs: f64 },
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShellFailed { exit_code, stderr_tail } => {
                write!(f, "shell step exited with {exit_code:?}: {stderr_tail}")
            }
            Self::ShellSpawnFailed { reason } => write!(f, "failed to spawn shell step: {reason}"),
            Self::BadPath { path } => write!(f, "path '{path}' escapes the workspace directory"),
            Self::WriteFailed { path, reason } => {
                write!(f, "failed to write '{path}': {reason}")
            }
            Self::LlmFailed { reason } => write!(f, "llm step failed: {reason}"),
            Self::Timeout { elapsed_secs } => write!(f, "step timed out after {elapsed_secs:.1}s"),
            Self::Cancelled { elapsed_secs } => {
                write!(f, "step cancelled after {elapsed_secs:.1}s")
            }
        }
    }
}

impl std::error::Error for StepError {}

impl StepError {
    /// Short machine-readable kind, used in `STEP_FAILED` event payloads.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ShellFailed { .. } | Self::ShellSpawnFailed { .. } => "SHELL_ERROR",
            Self::BadPath { .. } => "BAD_PATH",
            Self::WriteFailed { .. } => "WRITE_ERROR",
            Self::LlmFailed { .. } => "PROVIDER_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Cancelled { .. } => "CANCELLED",
        }
    }
}

/// Errors at the workflow level, as opposed to a single step.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowError {
    /// No workflow is registered under the requested name.
    NotFound { name: String },
    /// A named step failed; the workflow as a whole is considered failed.
    StepFailed { step_name: String, source: StepError },
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "no workflow registered as '{name}'"),
            Self::StepFailed { step_name, source } => {
                write!(f, "step '{step_name}' failed: {source}")
            }
        }
    }
}

impl std::error::Error for WorkflowError {}
