//! Postgres-backed [`Store`] implementation.
//!
//! The claim primitive uses `SELECT ... FOR UPDATE SKIP LOCKED` nested inside
//! an `UPDATE ... WHERE id = (...) RETURNING *`: at most one concurrent
//! transaction can select and lock the same queued row, so at most one
//! caller ever sees it transition to `RUNNING`. Every other status change is
//! a plain conditional `UPDATE ... WHERE status = $expected`, which gives
//! the same single-winner guarantee without needing row locks explicitly.

use crate::error::StoreError;
use crate::model::{Event, Project, Run, RunStatus, RunType};
use agent_runner_core::{EventId, ProjectId, RunId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use tokio::sync::broadcast;

#[derive(FromRow)]
struct ProjectRow {
    id: String,
    name: String,
    local_path: String,
    created_at: DateTime<Utc>,
}

impl ProjectRow {
    fn try_into_project(self) -> Result<Project, StoreError> {
        let id = ProjectId::from_str(&self.id)
            .map_err(|e| StoreError::decode("project", &self.id, e))?;
        Ok(Project {
            id,
            name: self.name,
            local_path: self.local_path,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct RunRow {
    id: String,
    project_id: String,
    name: Option<String>,
    goal: String,
    run_type: String,
    status: String,
    current_iteration: i64,
    options: JsonValue,
    metadata: JsonValue,
    created_at: DateTime<Utc>,
}

impl RunRow {
    fn try_into_run(self) -> Result<Run, StoreError> {
        let id = RunId::from_str(&self.id).map_err(|e| StoreError::decode("run", &self.id, e))?;
        let project_id = ProjectId::from_str(&self.project_id)
            .map_err(|e| StoreError::decode("project", &self.project_id, e))?;
        Ok(Run {
            id,
            project_id,
            name: self.name,
            goal: self.goal,
            run_type: RunType::from_str_value(&self.run_type),
            status: RunStatus::from_str_value(&self.status),
            current_iteration: self.current_iteration,
            options: self.options,
            metadata: self.metadata,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct EventRow {
    id: i64,
    run_id: String,
    event_type: String,
    payload: JsonValue,
    created_at: DateTime<Utc>,
}

impl EventRow {
    fn try_into_event(self) -> Result<Event, StoreError> {
        let run_id =
            RunId::from_str(&self.run_id).map_err(|e| StoreError::decode("run", &self.run_id, e))?;
        Ok(Event {
            id: EventId::new(self.id),
            run_id,
            event_type: self.event_type,
            payload: self.payload,
            created_at: self.created_at,
        })
    }
}

const RUN_COLUMNS: &str = "id, project_id, name, goal, run_type, status, current_iteration, \
                            options, metadata, created_at";
const EVENT_COLUMNS: &str = "id, run_id, event_type, payload, created_at";

/// A [`Store`](crate::Store) backed by Postgres via `sqlx`.
///
/// Holds, alongside the connection pool, an in-process registry of
/// broadcast channels used to fan live events out to SSE subscribers without
/// a second polling query per connection.
pub struct PostgresStore {
    pool: PgPool,
    channels: Mutex<HashMap<RunId, broadcast::Sender<Event>>>,
}

impl PostgresStore {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn sender_for(&self, run_id: RunId) -> broadcast::Sender<Event> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(run_id)
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }
}

#[async_trait]
impl crate::Store for PostgresStore {
    async fn create_project(&self, name: &str, local_path: &str) -> Result<Project, StoreError> {
        let existing = sqlx::query("SELECT 1 FROM projects WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(StoreError::NameConflict {
                name: name.to_string(),
            });
        }

        let project = Project::new(name, local_path);
        sqlx::query(
            "INSERT INTO projects (id, name, local_path, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(project.id.to_string())
        .bind(&project.name)
        .bind(&project.local_path)
        .bind(project.created_at)
        .execute(&self.pool)
        .await?;

        Ok(project)
    }

    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        let row: Option<ProjectRow> =
            sqlx::query_as("SELECT id, name, local_path, created_at FROM projects WHERE id = $1")
                .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProjectRow::try_into_project).transpose()
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            "SELECT id, name, local_path, created_at FROM projects ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ProjectRow::try_into_project).collect()
    }

    async fn create_run(
        &self,
        project_id: ProjectId,
        goal: &str,
        name: Option<String>,
        run_type: RunType,
        options: JsonValue,
        metadata: JsonValue,
    ) -> Result<Run, StoreError> {
        let run = Run::new(project_id, goal, name, run_type, options, metadata);

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO runs ({RUN_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(run.id.to_string())
        .bind(run.project_id.to_string())
        .bind(&run.name)
        .bind(&run.goal)
        .bind(run.run_type.as_str())
        .bind(run.status.as_str())
        .bind(run.current_iteration)
        .bind(&run.options)
        .bind(&run.metadata)
        .bind(run.created_at)
        .execute(&mut *tx)
        .await?;

        let event_row: EventRow = sqlx::query_as(&format!(
            "INSERT INTO events (run_id, event_type, payload, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING {EVENT_COLUMNS}"
        ))
        .bind(run.id.to_string())
        .bind(crate::model::event_type::RUN_CREATED)
        .bind(JsonValue::Null)
        .bind(run.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let event = event_row.try_into_event()?;
        let _ = self.sender_for(run.id).send(event);

        Ok(run)
    }

    async fn get_run(&self, id: RunId) -> Result<Option<Run>, StoreError> {
        let row: Option<RunRow> =
            sqlx::query_as(&format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = $1"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(RunRow::try_into_run).transpose()
    }

    async fn list_runs(&self) -> Result<Vec<Run>, StoreError> {
        let rows: Vec<RunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM runs ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RunRow::try_into_run).collect()
    }

    async fn claim_next_queued(&self) -> Result<Option<Run>, StoreError> {
        let row: Option<RunRow> = sqlx::query_as(&format!(
            "UPDATE runs SET status = 'RUNNING' \
             WHERE id = ( \
                 SELECT id FROM runs WHERE status = 'QUEUED' \
                 ORDER BY created_at ASC LIMIT 1 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {RUN_COLUMNS}"
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.map(RunRow::try_into_run).transpose()
    }

    async fn transition(
        &self,
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE runs SET status = $3 WHERE id = $1 AND status = $2")
            .bind(run_id.to_string())
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn transition_with_event(
        &self,
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE runs SET status = $3 WHERE id = $1 AND status = $2")
            .bind(run_id.to_string())
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        let event_row: EventRow = sqlx::query_as(&format!(
            "INSERT INTO events (run_id, event_type, payload, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING {EVENT_COLUMNS}"
        ))
        .bind(run_id.to_string())
        .bind(event_type)
        .bind(&payload)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let event = event_row.try_into_event()?;
        let _ = self.sender_for(run_id).send(event);

        Ok(true)
    }

    async fn bump_iteration(&self, run_id: RunId) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "UPDATE runs SET current_iteration = current_iteration + 1 \
             WHERE id = $1 RETURNING current_iteration",
        )
        .bind(run_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("current_iteration")?)
    }

    async fn append_event(
        &self,
        run_id: RunId,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<Event, StoreError> {
        let event_row: EventRow = sqlx::query_as(&format!(
            "INSERT INTO events (run_id, event_type, payload, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING {EVENT_COLUMNS}"
        ))
        .bind(run_id.to_string())
        .bind(event_type)
        .bind(&payload)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        let event = event_row.try_into_event()?;
        let _ = self.sender_for(run_id).send(event.clone());

        Ok(event)
    }

    async fn list_events(
        &self,
        run_id: RunId,
        after_id: Option<EventId>,
        limit: Option<i64>,
    ) -> Result<Vec<Event>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE run_id = $1 AND id > $2 \
             ORDER BY created_at ASC, id ASC \
             LIMIT $3"
        ))
        .bind(run_id.to_string())
        .bind(after_id.map(|e| e.value()).unwrap_or(0))
        .bind(limit.unwrap_or(1000))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::try_into_event).collect()
    }

    fn subscribe(&self, run_id: RunId) -> broadcast::Receiver<Event> {
        self.sender_for(run_id).subscribe()
    }
}
