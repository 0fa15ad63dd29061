//! An in-memory [`Store`] used by unit and integration tests so the rest of
//! the control plane can be exercised without a running Postgres instance.
//!
//! Mirrors the Postgres implementation's semantics exactly: the claim is a
//! single conditional swap guarded by a mutex, so it is just as safe under
//! concurrent callers, only uniprocess instead of cross-process.

use crate::error::StoreError;
use crate::model::{Event, Project, Run, RunStatus, RunType};
use agent_runner_core::{EventId, ProjectId, RunId};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

#[derive(Default)]
struct Inner {
    projects: HashMap<ProjectId, Project>,
    runs: HashMap<RunId, Run>,
    events: Vec<Event>,
    next_event_id: i64,
    channels: HashMap<RunId, broadcast::Sender<Event>>,
}

/// An in-memory [`Store`](crate::Store), suitable for tests and for running
/// the control plane with `DATABASE_URL` unset.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl crate::Store for InMemoryStore {
    async fn create_project(&self, name: &str, local_path: &str) -> Result<Project, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.projects.values().any(|p| p.name == name) {
            return Err(StoreError::NameConflict {
                name: name.to_string(),
            });
        }
        let project = Project::new(name, local_path);
        inner.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        Ok(self.inner.lock().unwrap().projects.get(&id).cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let mut projects: Vec<Project> =
            self.inner.lock().unwrap().projects.values().cloned().collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
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

        let mut inner = self.inner.lock().unwrap();
        inner.runs.insert(run.id, run.clone());
        let event = push_event(&mut inner, run.id, crate::model::event_type::RUN_CREATED, JsonValue::Null);
        let sender = inner
            .channels
            .entry(run.id)
            .or_insert_with(|| broadcast::channel(256).0)
            .clone();
        drop(inner);
        let _ = sender.send(event);

        Ok(run)
    }

    async fn get_run(&self, id: RunId) -> Result<Option<Run>, StoreError> {
        Ok(self.inner.lock().unwrap().runs.get(&id).cloned())
    }

    async fn list_runs(&self) -> Result<Vec<Run>, StoreError> {
        let mut runs: Vec<Run> = self.inner.lock().unwrap().runs.values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }

    async fn claim_next_queued(&self) -> Result<Option<Run>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let next_id = inner
            .runs
            .values()
            .filter(|r| r.status == RunStatus::Queued)
            .min_by_key(|r| r.created_at)
            .map(|r| r.id);

        match next_id {
            Some(id) => {
                let run = inner.runs.get_mut(&id).expect("id came from this map");
                run.status = RunStatus::Running;
                Ok(Some(run.clone()))
            }
            None => Ok(None),
        }
    }

    async fn transition(
        &self,
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.runs.get_mut(&run_id) {
            Some(run) if run.status == from => {
                run.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_with_event(
        &self,
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.runs.get_mut(&run_id) {
            Some(run) if run.status == from => {
                run.status = to;
                let event = push_event(&mut inner, run_id, event_type, payload);
                let sender = inner
                    .channels
                    .entry(run_id)
                    .or_insert_with(|| broadcast::channel(256).0)
                    .clone();
                drop(inner);
                let _ = sender.send(event);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn bump_iteration(&self, run_id: RunId) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let run = inner
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| StoreError::run_not_found(run_id))?;
        run.current_iteration += 1;
        Ok(run.current_iteration)
    }

    async fn append_event(
        &self,
        run_id: RunId,
        event_type: &str,
        payload: JsonValue,
    ) -> Result<Event, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.runs.contains_key(&run_id) {
            return Err(StoreError::run_not_found(run_id));
        }
        let event = push_event(&mut inner, run_id, event_type, payload);
        let sender = inner
            .channels
            .entry(run_id)
            .or_insert_with(|| broadcast::channel(256).0)
            .clone();
        drop(inner);
        let _ = sender.send(event.clone());
        Ok(event)
    }

    async fn list_events(
        &self,
        run_id: RunId,
        after_id: Option<EventId>,
        limit: Option<i64>,
    ) -> Result<Vec<Event>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let after = after_id.map(|e| e.value()).unwrap_or(0);
        let mut events: Vec<Event> = inner
            .events
            .iter()
            .filter(|e| e.run_id == run_id && e.id.value() > after)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            events.truncate(limit.max(0) as usize);
        }
        Ok(events)
    }

    fn subscribe(&self, run_id: RunId) -> broadcast::Receiver<Event> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .channels
            .entry(run_id)
            .or_insert_with(|| broadcast::channel(256).0)
            .subscribe()
    }
}

fn push_event(inner: &mut Inner, run_id: RunId, event_type: &str, payload: JsonValue) -> Event {
    inner.next_event_id += 1;
    let event = Event {
        id: EventId::new(inner.next_event_id),
        run_id,
        event_type: event_type.to_string(),
        payload,
        created_at: Utc::now(),
    };
    inner.events.push(event.clone());
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[tokio::test]
    async fn create_project_rejects_duplicate_name() {
        let store = InMemoryStore::new();
        store.create_project("demo", "/tmp/demo").await.unwrap();
        let err = store.create_project("demo", "/tmp/other").await.unwrap_err();
        assert!(matches!(err, StoreError::NameConflict { .. }));
    }

    #[tokio::test]
    async fn create_run_appends_run_created() {
        let store = InMemoryStore::new();
        let project = store.create_project("demo", "/tmp/demo").await.unwrap();
        let run = store
            .create_run(
                project.id,
                "hello",
                None,
                RunType::Agent,
                JsonValue::Null,
                JsonValue::Null,
            )
            .await
            .unwrap();

        let events = store.list_events(run.id, None, None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, crate::model::event_type::RUN_CREATED);
    }

    #[tokio::test]
    async fn claim_next_queued_is_single_winner() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let project = store.create_project("demo", "/tmp/demo").await.unwrap();
        store
            .create_run(
                project.id,
                "hello",
                None,
                RunType::Agent,
                JsonValue::Null,
                JsonValue::Null,
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.claim_next_queued().await }));
        }

        let mut claimed = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_some() {
                claimed += 1;
            }
        }

        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn transition_with_event_rejects_wrong_source_state() {
        let store = InMemoryStore::new();
        let project = store.create_project("demo", "/tmp/demo").await.unwrap();
        let run = store
            .create_run(
                project.id,
                "hello",
                None,
                RunType::Agent,
                JsonValue::Null,
                JsonValue::Null,
            )
            .await
            .unwrap();

        // Run is QUEUED, not RUNNING: a resume (PAUSED -> RUNNING) must no-op.
        let ok = store
            .transition_with_event(
                run.id,
                RunStatus::Paused,
                RunStatus::Running,
                "RUN_RESUME",
                JsonValue::Null,
            )
            .await
            .unwrap();
        assert!(!ok);

        let events = store.list_events(run.id, None, None).await.unwrap();
        assert_eq!(events.len(), 1); // only RUN_CREATED
    }

    #[tokio::test]
    async fn list_events_after_id_cursor() {
        let store = InMemoryStore::new();
        let project = store.create_project("demo", "/tmp/demo").await.unwrap();
        let run = store
            .create_run(
                project.id,
                "hello",
                None,
                RunType::Agent,
                JsonValue::Null,
                JsonValue::Null,
            )
            .await
            .unwrap();
        store
            .append_event(run.id, "AGENT_THINKING", JsonValue::Null)
            .await
            .unwrap();
        store
            .append_event(run.id, "RUN_COMPLETED", JsonValue::Null)
            .await
            .unwrap();

        let all = store.list_events(run.id, None, None).await.unwrap();
        assert_eq!(all.len(), 3);

        let last_id = all.last().unwrap().id;
        let empty = store.list_events(run.id, Some(last_id), None).await.unwrap();
        assert!(empty.is_empty());

        let cursor = EventId::new(last_id.value() - 2);
        let tail = store.list_events(run.id, Some(cursor), None).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].event_type, "AGENT_THINKING");
        assert_eq!(tail[1].event_type, "RUN_COMPLETED");
    }
}
