//! Domain types stored by the control plane: Projects, Runs, and Events.

use agent_runner_core::{EventId, ProjectId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A named workspace on local storage. Created explicitly, never modified,
/// never auto-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub local_path: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    #[must_use]
    pub fn new(name: impl Into<String>, local_path: impl Into<String>) -> Self {
        Self {
            id: ProjectId::new(),
            name: name.into(),
            local_path: local_path.into(),
            created_at: Utc::now(),
        }
    }
}

/// The kind of execution a Run should be dispatched to by the Agent Executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Agent,
    Workflow,
    Pipeline,
    Task,
}

impl RunType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Workflow => "workflow",
            Self::Pipeline => "pipeline",
            Self::Task => "task",
        }
    }

    #[must_use]
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "workflow" => Self::Workflow,
            "pipeline" => Self::Pipeline,
            "task" => Self::Task,
            _ => Self::Agent,
        }
    }
}

impl Default for RunType {
    fn default() -> Self {
        Self::Agent
    }
}

/// Status of a Run. See the state machine in the workflow engine's docs for
/// the legal transitions between these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Queued,
    Running,
    Paused,
    Stopped,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    #[must_use]
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "RUNNING" => Self::Running,
            "PAUSED" => Self::Paused,
            "STOPPED" => Self::Stopped,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            _ => Self::Queued,
        }
    }

    /// Terminal states are absorbing: `{COMPLETED, FAILED, STOPPED}`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

/// A unit of work against a Project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub project_id: ProjectId,
    pub name: Option<String>,
    pub goal: String,
    pub run_type: RunType,
    pub status: RunStatus,
    pub current_iteration: i64,
    pub options: JsonValue,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl Run {
    #[must_use]
    pub fn new(
        project_id: ProjectId,
        goal: impl Into<String>,
        name: Option<String>,
        run_type: RunType,
        options: JsonValue,
        metadata: JsonValue,
    ) -> Self {
        Self {
            id: RunId::new(),
            project_id,
            name,
            goal: goal.into(),
            run_type,
            status: RunStatus::Queued,
            current_iteration: 0,
            options,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// An immutable record in a Run's timeline. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub run_id: RunId,
    pub event_type: String,
    pub payload: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// The well-known event type names forming the wire contract clients depend
/// on. Stored as plain strings on [`Event`] so new provider- or
/// workflow-internal types never require a store migration, but producers
/// should use these constants rather than ad hoc literals.
pub mod event_type {
    pub const RUN_CREATED: &str = "RUN_CREATED";
    pub const RUN_STARTED: &str = "RUN_STARTED";
    pub const RUN_PAUSE: &str = "RUN_PAUSE";
    pub const RUN_RESUME: &str = "RUN_RESUME";
    pub const RUN_STOP: &str = "RUN_STOP";
    pub const RUN_COMPLETED: &str = "RUN_COMPLETED";
    pub const RUN_FAILED: &str = "RUN_FAILED";
    pub const RUN_STOPPED: &str = "RUN_STOPPED";

    pub const AGENT_THINKING: &str = "AGENT_THINKING";
    pub const PLAN_GENERATED: &str = "PLAN_GENERATED";
    pub const EXECUTING: &str = "EXECUTING";
    pub const DIRECTIVE: &str = "DIRECTIVE";

    pub const WORKFLOW_STARTED: &str = "WORKFLOW_STARTED";
    pub const WORKFLOW_COMPLETED: &str = "WORKFLOW_COMPLETED";
    pub const WORKFLOW_FAILED: &str = "WORKFLOW_FAILED";

    pub const STEP_STARTED: &str = "STEP_STARTED";
    pub const STEP_COMPLETED: &str = "STEP_COMPLETED";
    pub const STEP_FAILED: &str = "STEP_FAILED";

    pub const LLM_LOADING_MODEL: &str = "LLM_LOADING_MODEL";
    pub const LLM_GENERATING: &str = "LLM_GENERATING";
    pub const LLM_HEARTBEAT: &str = "LLM_HEARTBEAT";
    pub const LLM_DONE: &str = "LLM_DONE";

    pub const SHELL_EXECUTING: &str = "SHELL_EXECUTING";
    pub const ARTIFACT_CREATED: &str = "ARTIFACT_CREATED";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_roundtrip() {
        for status in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Paused,
            RunStatus::Stopped,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            assert_eq!(RunStatus::from_str_value(status.as_str()), status);
        }
    }

    #[test]
    fn run_status_terminal() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Stopped.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
    }

    #[test]
    fn run_type_roundtrip() {
        for rt in [
            RunType::Agent,
            RunType::Workflow,
            RunType::Pipeline,
            RunType::Task,
        ] {
            assert_eq!(RunType::from_str_value(rt.as_str()), rt);
        }
    }

    #[test]
    fn run_type_default_is_agent() {
        assert_eq!(RunType::default(), RunType::Agent);
    }

    #[test]
    fn new_run_is_queued_at_iteration_zero() {
        let run = Run::new(
            ProjectId::new(),
            "hello",
            None,
            RunType::Agent,
            JsonValue::Null,
            JsonValue::Null,
        );
        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(run.current_iteration, 0);
    }
}
