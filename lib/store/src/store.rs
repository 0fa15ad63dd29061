//! The [`Store`] trait: the one shared mutable resource between workers.
//!
//! Every cross-worker state change is expressed through this trait as a
//! conditional update, so the safety property "no Run is executed by two
//! workers concurrently" reduces to "the backend's conditional UPDATE is
//! atomic" — true of any engine offering `UPDATE ... WHERE` with a
//! row-count result.

use crate::error::StoreError;
use crate::model::{Event, Project, Run, RunStatus, RunType};
use agent_runner_core::{EventId, ProjectId, RunId};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Durable storage of Projects, Runs, and Events, plus the atomic claim
/// primitive the background worker relies on.
#[async_trait]
pub trait Store: Send + Sync {
    /// Creates a Project. Fails with [`StoreError::NameConflict`] if a
    /// Project with this name already exists.
    async fn create_project(
        &self,
        name: &str,
        local_path: &str,
    ) -> Result<Project, StoreError>;

    /// Fetches a Project by id.
    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, StoreError>;

    /// Lists all Projects.
    async fn list_projects(&self) -> Result<Vec<Project>, StoreError>;

    /// Creates a Run in `QUEUED` status with `current_iteration = 0` and
    /// appends its `RUN_CREATED` event, both in one transaction.
    #[allow(clippy::too_many_arguments)]
    async fn create_run(
        &self,
        project_id: ProjectId,
        goal: &str,
        name: Option<String>,
        run_type: RunType,
        options: JsonValue,
        metadata: JsonValue,
    ) -> Result<Run, StoreError>;

    /// Fetches a Run by id.
    async fn get_run(&self, id: RunId) -> Result<Option<Run>, StoreError>;

    /// Lists all Runs, newest first.
    async fn list_runs(&self) -> Result<Vec<Run>, StoreError>;

    /// Atomically claims the oldest `QUEUED` Run, transitioning it to
    /// `RUNNING` and appending `RUN_STARTED` is the caller's responsibility,
    /// not this method's — claiming only flips status so a concurrent
    /// claimant can never win the same Run twice.
    async fn claim_next_queued(&self) -> Result<Option<Run>, StoreError>;

    /// Conditionally transitions a Run from `from` to `to`. Returns `false`
    /// without error if the Run is not currently in `from` — a lost race or
    /// an illegal transition are the same outcome at this layer; callers
    /// distinguish them (the API maps a no-op transition attempted by a user
    /// action to `409 Conflict`).
    async fn transition(
        &self,
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<bool, StoreError>;

    /// Conditionally transitions a Run and appends an event in the same
    /// transaction. Returns `false` (and appends nothing) if the Run was not
    /// in `from`.
    async fn transition_with_event(
        &self,
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<bool, StoreError>;

    /// Bumps `current_iteration` by one. Never decreases.
    async fn bump_iteration(&self, run_id: RunId) -> Result<i64, StoreError>;

    /// Appends an event to a Run's log. Returns the assigned, strictly
    /// increasing [`EventId`].
    async fn append_event(
        &self,
        run_id: RunId,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<Event, StoreError>;

    /// Lists events for a Run ordered by `(created_at, id)` ascending,
    /// optionally starting after a given cursor and bounded by `limit`.
    async fn list_events(
        &self,
        run_id: RunId,
        after_id: Option<EventId>,
        limit: Option<i64>,
    ) -> Result<Vec<Event>, StoreError>;

    /// Subscribes to events appended to a Run from this point forward. Used
    /// by the event stream server to deliver live updates without polling
    /// the backend; callers still replay history via [`Store::list_events`]
    /// first since a subscription carries no backlog.
    fn subscribe(&self, run_id: RunId) -> tokio::sync::broadcast::Receiver<Event>;
}
