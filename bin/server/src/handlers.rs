//! HTTP handlers for the Control Plane API.

use crate::error::ApiError;
use crate::state::AppState;
use agent_runner_core::{EventId, ProjectId, RunId};
use agent_runner_store::{event_type, Project, Run, RunStatus, RunType};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::str::FromStr;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub local_path: String,
}

pub async fn create_project(
    State(state): State<AppState>,
    Json(body): Json<CreateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::validation("name must not be empty"));
    }
    if body.local_path.trim().is_empty() {
        return Err(ApiError::validation("local_path must not be empty"));
    }
    let project = state.store.create_project(&body.name, &body.local_path).await?;
    Ok(Json(project))
}

pub async fn list_projects(State(state): State<AppState>) -> Result<Json<Vec<Project>>, ApiError> {
    Ok(Json(state.store.list_projects().await?))
}

#[derive(Deserialize)]
pub struct CreateRunRequest {
    pub project_id: String,
    pub goal: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub run_type: Option<String>,
    #[serde(default)]
    pub options: Option<JsonValue>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

pub async fn create_run(
    State(state): State<AppState>,
    Json(body): Json<CreateRunRequest>,
) -> Result<Json<Run>, ApiError> {
    if body.goal.trim().is_empty() {
        return Err(ApiError::validation("goal must not be empty"));
    }
    let project_id = ProjectId::from_str(&body.project_id)
        .map_err(|e| ApiError::validation(format!("invalid project_id: {e}")))?;

    if state.store.get_project(project_id).await?.is_none() {
        return Err(ApiError::NotFound { what: "project", id: body.project_id });
    }

    let run_type = body
        .run_type
        .as_deref()
        .map(RunType::from_str_value)
        .unwrap_or_default();

    let run = state
        .store
        .create_run(
            project_id,
            &body.goal,
            body.name,
            run_type,
            body.options.unwrap_or(JsonValue::Null),
            body.metadata.unwrap_or(JsonValue::Null),
        )
        .await?;

    Ok(Json(run))
}

pub async fn list_runs(State(state): State<AppState>) -> Result<Json<Vec<Run>>, ApiError> {
    Ok(Json(state.store.list_runs().await?))
}

fn parse_run_id(raw: &str) -> Result<RunId, ApiError> {
    RunId::from_str(raw).map_err(|e| ApiError::validation(format!("invalid run id: {e}")))
}

async fn load_run(state: &AppState, run_id: RunId) -> Result<Run, ApiError> {
    state
        .store
        .get_run(run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound { what: "run", id: run_id.to_string() })
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Run>, ApiError> {
    let run_id = parse_run_id(&id)?;
    Ok(Json(load_run(&state, run_id).await?))
}

/// Shared logic for `pause`/`resume`/`stop`: load the Run (404 if missing),
/// then attempt the transition. A transition the Run's current status does
/// not permit is a `409`, not a `404` or `422` — the Run exists and the
/// request was well-formed, it simply cannot be honored right now.
async fn transition_or_conflict(
    state: &AppState,
    run_id: RunId,
    from: RunStatus,
    to: RunStatus,
    event_type: &str,
    payload: JsonValue,
) -> Result<Run, ApiError> {
    load_run(state, run_id).await?;

    let applied = state
        .store
        .transition_with_event(run_id, from, to, event_type, payload)
        .await?;

    if !applied {
        return Err(ApiError::conflict(format!(
            "run is not in a state that allows this transition to {}",
            to.as_str()
        )));
    }

    load_run(state, run_id).await
}

pub async fn pause_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Run>, ApiError> {
    let run_id = parse_run_id(&id)?;
    let run = transition_or_conflict(
        &state,
        run_id,
        RunStatus::Running,
        RunStatus::Paused,
        event_type::RUN_PAUSE,
        json!({}),
    )
    .await?;
    Ok(Json(run))
}

pub async fn resume_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Run>, ApiError> {
    let run_id = parse_run_id(&id)?;
    let run = transition_or_conflict(
        &state,
        run_id,
        RunStatus::Paused,
        RunStatus::Running,
        event_type::RUN_RESUME,
        json!({}),
    )
    .await?;
    Ok(Json(run))
}

pub async fn stop_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Run>, ApiError> {
    let run_id = parse_run_id(&id)?;
    let current = load_run(&state, run_id).await?;

    if current.status.is_terminal() {
        return Err(ApiError::conflict("run has already reached a terminal state"));
    }

    let applied = state
        .store
        .transition_with_event(
            run_id,
            current.status,
            RunStatus::Stopped,
            event_type::RUN_STOPPED,
            json!({}),
        )
        .await?;

    if !applied {
        return Err(ApiError::conflict("run is not in a state that allows stopping"));
    }

    // Signal cancellation regardless of which worker (if any) currently
    // owns the Run; a Run that was QUEUED has no token registered yet and
    // simply never gets claimed once the store already shows STOPPED.
    state.cancel_registry.signal_stop(run_id);

    Ok(Json(load_run(&state, run_id).await?))
}

#[derive(Deserialize)]
pub struct DirectiveRequest {
    pub text: String,
}

pub async fn append_directive(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DirectiveRequest>,
) -> Result<Json<agent_runner_store::Event>, ApiError> {
    let run_id = parse_run_id(&id)?;
    let run = load_run(&state, run_id).await?;

    if run.status.is_terminal() {
        return Err(ApiError::conflict("run has already reached a terminal state"));
    }

    let event = state
        .store
        .append_event(run_id, event_type::DIRECTIVE, json!({ "text": body.text }))
        .await?;
    Ok(Json(event))
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub after_id: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<agent_runner_store::Event>>, ApiError> {
    let run_id = parse_run_id(&id)?;
    load_run(&state, run_id).await?;

    let events = state
        .store
        .list_events(run_id, query.after_id.map(EventId::new), query.limit)
        .await?;
    Ok(Json(events))
}

#[derive(Serialize)]
pub struct WorkerStatusResponse {
    pub shutting_down: bool,
    pub active_run_ids: Vec<String>,
}

pub async fn worker_status(State(state): State<AppState>) -> Json<WorkerStatusResponse> {
    let status = state.worker.status();
    Json(WorkerStatusResponse {
        shutting_down: status.shutting_down,
        active_run_ids: status.active_run_ids.iter().map(ToString::to_string).collect(),
    })
}

#[derive(Serialize)]
pub struct WorkerProcessResponse {
    pub claimed: bool,
}

pub async fn worker_process(State(state): State<AppState>) -> Json<WorkerProcessResponse> {
    let claimed = state.worker.process_once().await;
    Json(WorkerProcessResponse { claimed })
}
