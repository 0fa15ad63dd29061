//! The Agent Executor: decides whether a Run follows the Workflow Engine or
//! the simple simulated path, then drives it to a terminal state.

use crate::error::ExecutorError;
use crate::options::RunOptions;
use agent_runner_core::RunId;
use agent_runner_llm::LlmBackend;
use agent_runner_store::{event_type, Run, RunStatus, RunType, Store};
use agent_runner_workflow::{execute_workflow, EngineConfig, StepError, WorkflowError, WorkflowRegistry};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Executor-wide defaults; per-Run overrides come from [`RunOptions`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub default_model: String,
    pub default_timeout: Duration,
    pub default_heartbeat_interval: Duration,
    /// Delay between the simple path's simulated phases.
    pub simple_phase_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_model: "llama3".to_string(),
            default_timeout: Duration::from_secs(120),
            default_heartbeat_interval: Duration::from_secs(15),
            simple_phase_delay: Duration::from_millis(200),
        }
    }
}

/// Drives a single Run, already claimed and `RUNNING`, to a terminal state.
pub struct AgentExecutor<'a> {
    pub store: &'a dyn Store,
    pub llm: &'a dyn LlmBackend,
    pub registry: &'a WorkflowRegistry,
    pub config: ExecutorConfig,
}

impl<'a> AgentExecutor<'a> {
    #[must_use]
    pub fn new(
        store: &'a dyn Store,
        llm: &'a dyn LlmBackend,
        registry: &'a WorkflowRegistry,
        config: ExecutorConfig,
    ) -> Self {
        Self { store, llm, registry, config }
    }

    /// Executes `run` to completion. `workspace_path` is the owning
    /// Project's workspace directory, passed through to the Workflow Engine
    /// for `FILE_WRITE`/`SHELL` steps.
    pub async fn execute(
        &self,
        run: &Run,
        workspace_path: &Path,
        cancel: CancellationToken,
    ) -> Result<(), ExecutorError> {
        let options = RunOptions::parse(&run.options);

        let workflow = match (run.run_type, &options.workflow_name) {
            (RunType::Workflow, Some(name)) => self.registry.get(name),
            _ => None,
        };

        let result = if let Some(workflow) = workflow {
            self.run_workflow_path(run.id, workflow, workspace_path, &options, &cancel).await
        } else {
            self.run_simple_path(run.id, run, &cancel).await
        };

        result
    }

    async fn run_workflow_path(
        &self,
        run_id: RunId,
        workflow: &agent_runner_workflow::Workflow,
        workspace_path: &Path,
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutorError> {
        let engine_config = EngineConfig {
            default_model: self.config.default_model.clone(),
            default_step_timeout: options.timeout(self.config.default_timeout),
            heartbeat_interval: options.heartbeat_interval(self.config.default_heartbeat_interval),
        };

        let models = if options.models.is_null() {
            json!({})
        } else {
            options.models.clone()
        };

        match execute_workflow(
            workflow,
            run_id,
            workspace_path,
            &models,
            self.llm,
            self.store,
            cancel,
            &engine_config,
        )
        .await
        {
            Ok(()) => self.complete(run_id).await,
            Err(WorkflowError::StepFailed { source, .. }) => {
                self.fail_or_stop(run_id, cancel, &source.to_string(), was_cancellation(&source))
                    .await
            }
            Err(WorkflowError::NotFound { name }) => {
                warn!(run_id = %run_id, workflow = %name, "workflow disappeared from registry mid-dispatch");
                self.fail_or_stop(run_id, cancel, &format!("workflow '{name}' not found"), false)
                    .await
            }
        }
    }

    async fn run_simple_path(
        &self,
        run_id: RunId,
        run: &Run,
        cancel: &CancellationToken,
    ) -> Result<(), ExecutorError> {
        let phases = [
            (event_type::RUN_STARTED, json!({ "goal": run.goal })),
            (event_type::AGENT_THINKING, json!({})),
            (event_type::PLAN_GENERATED, json!({ "goal": run.goal, "steps": 1 })),
            (event_type::EXECUTING, json!({})),
        ];

        for (kind, payload) in phases {
            self.wait_while_paused(run_id, cancel).await;

            if sleep_or_cancelled(self.config.simple_phase_delay, cancel).await {
                return self.stop(run_id).await;
            }
            self.store.append_event(run_id, kind, payload).await.ok();
        }

        self.complete(run_id).await
    }

    /// Blocks while `run_id` is PAUSED, polling the store rather than
    /// holding a lock; pausing the simple path is cooperative, the same as
    /// pausing between Workflow Engine steps.
    async fn wait_while_paused(&self, run_id: RunId, cancel: &CancellationToken) {
        loop {
            match self.store.get_run(run_id).await {
                Ok(Some(run)) if run.status == RunStatus::Paused => {
                    tokio::select! {
                        () = cancel.cancelled() => return,
                        () = tokio::time::sleep(Duration::from_millis(200)) => {}
                    }
                }
                _ => return,
            }
        }
    }

    /// Returns the Run's current status, defaulting to `Running` if it has
    /// somehow vanished, so a stale lookup still attempts the expected
    /// transition rather than silently giving up before trying.
    async fn current_status(&self, run_id: RunId) -> RunStatus {
        self.store
            .get_run(run_id)
            .await
            .ok()
            .flatten()
            .map_or(RunStatus::Running, |run| run.status)
    }

    async fn complete(&self, run_id: RunId) -> Result<(), ExecutorError> {
        let from = self.current_status(run_id).await;
        self.store
            .transition_with_event(
                run_id,
                from,
                RunStatus::Completed,
                event_type::RUN_COMPLETED,
                json!({}),
            )
            .await
            .ok();
        info!(run_id = %run_id, "run completed");
        Ok(())
    }

    async fn stop(&self, run_id: RunId) -> Result<(), ExecutorError> {
        let from = self.current_status(run_id).await;
        self.store
            .transition_with_event(
                run_id,
                from,
                RunStatus::Stopped,
                event_type::RUN_STOPPED,
                json!({}),
            )
            .await
            .ok();
        info!(run_id = %run_id, "run stopped");
        Err(ExecutorError::Stopped)
    }

    async fn fail_or_stop(
        &self,
        run_id: RunId,
        cancel: &CancellationToken,
        reason: &str,
        due_to_cancellation: bool,
    ) -> Result<(), ExecutorError> {
        if due_to_cancellation && cancel.is_cancelled() {
            return self.stop(run_id).await;
        }

        let from = self.current_status(run_id).await;
        self.store
            .transition_with_event(
                run_id,
                from,
                RunStatus::Failed,
                event_type::RUN_FAILED,
                json!({ "reason": reason }),
            )
            .await
            .ok();
        warn!(run_id = %run_id, reason, "run failed");
        Err(ExecutorError::Failed { reason: reason.to_string() })
    }
}

fn was_cancellation(err: &StepError) -> bool {
    matches!(err, StepError::Cancelled { .. })
}

/// Sleeps `duration` unless `cancel` fires first; returns whether it fired.
async fn sleep_or_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => false,
        () = cancel.cancelled() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_runner_llm::{LlmError, LlmRequest, LlmResponse, ProviderEvent};
    use agent_runner_store::InMemoryStore;
    use async_trait::async_trait;
    use serde_json::Value as JsonValue;

    struct NullBackend;

    #[async_trait]
    impl LlmBackend for NullBackend {
        async fn generate(
            &self,
            _request: &LlmRequest,
            _timeout: Duration,
            _cancel: CancellationToken,
            _on_event: &(dyn Fn(ProviderEvent) + Send + Sync),
        ) -> Result<LlmResponse, LlmError> {
            unreachable!("simple path never calls the LLM backend")
        }

        fn name(&self) -> &str {
            "null"
        }
    }

    #[tokio::test]
    async fn simple_path_runs_to_completion() {
        let store = InMemoryStore::new();
        let project = store.create_project("demo", "/tmp/demo").await.unwrap();
        let run = store
            .create_run(
                project.id,
                "say hello",
                None,
                RunType::Agent,
                JsonValue::Null,
                JsonValue::Null,
            )
            .await
            .unwrap();
        store
            .transition(run.id, RunStatus::Queued, RunStatus::Running)
            .await
            .unwrap();

        let backend = NullBackend;
        let registry = WorkflowRegistry::new();
        let executor = AgentExecutor::new(&store, &backend, &registry, ExecutorConfig {
            simple_phase_delay: Duration::from_millis(1),
            ..ExecutorConfig::default()
        });

        executor
            .execute(&run, Path::new("/tmp/demo"), CancellationToken::new())
            .await
            .unwrap();

        let updated = store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(updated.status, RunStatus::Completed);

        let events = store.list_events(run.id, None, None).await.unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "RUN_CREATED",
                "RUN_STARTED",
                "AGENT_THINKING",
                "PLAN_GENERATED",
                "EXECUTING",
                "RUN_COMPLETED",
            ]
        );
    }

    #[tokio::test]
    async fn pausing_the_simple_path_blocks_it_until_resumed() {
        let store = InMemoryStore::new();
        let project = store.create_project("demo", "/tmp/demo").await.unwrap();
        let run = store
            .create_run(
                project.id,
                "say hello",
                None,
                RunType::Agent,
                JsonValue::Null,
                JsonValue::Null,
            )
            .await
            .unwrap();
        store
            .transition(run.id, RunStatus::Queued, RunStatus::Running)
            .await
            .unwrap();
        store
            .transition(run.id, RunStatus::Running, RunStatus::Paused)
            .await
            .unwrap();

        let backend = NullBackend;
        let registry = WorkflowRegistry::new();
        let executor = AgentExecutor::new(&store, &backend, &registry, ExecutorConfig {
            simple_phase_delay: Duration::from_millis(1),
            ..ExecutorConfig::default()
        });

        let resume = async {
            // Give the execution its chance to observe PAUSED and start blocking.
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(store.get_run(run.id).await.unwrap().unwrap().status, RunStatus::Paused);
            store
                .transition(run.id, RunStatus::Paused, RunStatus::Running)
                .await
                .unwrap();
        };

        let (result, ()) = tokio::join!(
            executor.execute(&run, Path::new("/tmp/demo"), CancellationToken::new()),
            resume
        );
        result.unwrap();

        let updated = store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(updated.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn cancellation_stops_the_run_with_a_single_terminal_event() {
        let store = InMemoryStore::new();
        let project = store.create_project("demo", "/tmp/demo").await.unwrap();
        let run = store
            .create_run(
                project.id,
                "say hello",
                None,
                RunType::Agent,
                JsonValue::Null,
                JsonValue::Null,
            )
            .await
            .unwrap();
        store
            .transition(run.id, RunStatus::Queued, RunStatus::Running)
            .await
            .unwrap();

        let backend = NullBackend;
        let registry = WorkflowRegistry::new();
        let executor = AgentExecutor::new(&store, &backend, &registry, ExecutorConfig::default());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor.execute(&run, Path::new("/tmp/demo"), cancel).await;
        assert_eq!(result.unwrap_err(), ExecutorError::Stopped);

        let updated = store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(updated.status, RunStatus::Stopped);

        let events = store.list_events(run.id, None, None).await.unwrap();
        let terminal_count = events
            .iter()
            .filter(|e| matches!(e.event_type.as_str(), "RUN_COMPLETED" | "RUN_FAILED" | "RUN_STOPPED"))
            .count();
        assert_eq!(terminal_count, 1);
    }
}
