//! The Background Worker: claims queued Runs and drives each through the
//! Agent Executor, one Run per claim, many claims running concurrently.

use crate::registry::RunCancelRegistry;
use agent_runner_core::RunId;
use agent_runner_executor::{AgentExecutor, ExecutorConfig};
use agent_runner_llm::LlmBackend;
use agent_runner_store::Store;
use agent_runner_workflow::WorkflowRegistry;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Tunables read from the environment at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long to sleep between claim attempts once the queue runs dry.
    pub check_interval: Duration,
    /// Max Runs claimed and started concurrently per tick.
    pub batch_size: usize,
    /// How long `shutdown` waits for in-flight Runs before returning anyway.
    pub shutdown_grace_period: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            batch_size: 1,
            shutdown_grace_period: Duration::from_secs(30),
        }
    }
}

/// A snapshot of the worker's state, for `GET /worker/status`.
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub shutting_down: bool,
    pub active_run_ids: Vec<RunId>,
}

/// Claims and executes Runs. Safe to drive from a single `tokio::spawn`ed
/// loop ([`Worker::run_forever`]) or poked one claim at a time from an HTTP
/// handler ([`Worker::process_once`]) — both paths share the same
/// claim-and-execute logic, so `POST /worker/process` behaves exactly like
/// one iteration of the loop.
pub struct Worker {
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmBackend>,
    workflows: Arc<WorkflowRegistry>,
    cancel_registry: Arc<RunCancelRegistry>,
    executor_config: ExecutorConfig,
    config: WorkerConfig,
    shutdown: CancellationToken,
    active: Arc<Mutex<HashSet<RunId>>>,
}

impl Worker {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        llm: Arc<dyn LlmBackend>,
        workflows: Arc<WorkflowRegistry>,
        cancel_registry: Arc<RunCancelRegistry>,
        executor_config: ExecutorConfig,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            llm,
            workflows,
            cancel_registry,
            executor_config,
            config,
            shutdown: CancellationToken::new(),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            shutting_down: self.shutdown.is_cancelled(),
            active_run_ids: self.active.lock().unwrap().iter().copied().collect(),
        }
    }

    /// Runs the claim loop until `shutdown_token()` is cancelled, then waits
    /// up to `shutdown_grace_period` for in-flight Runs to reach a terminal
    /// state before returning.
    pub async fn run_forever(&self) {
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(self.config.check_interval) => {}
            }

            if self.shutdown.is_cancelled() {
                break;
            }

            self.drain_batch().await;
        }

        self.wait_for_drain().await;
    }

    /// Claims and runs at most one queued Run, without blocking on the
    /// check interval. Used by the manual `POST /worker/process` trigger.
    pub async fn process_once(&self) -> bool {
        self.claim_and_spawn().await
    }

    async fn drain_batch(&self) {
        for _ in 0..self.config.batch_size {
            if !self.claim_and_spawn().await {
                break;
            }
        }
    }

    async fn claim_and_spawn(&self) -> bool {
        let run = match self.store.claim_next_queued().await {
            Ok(Some(run)) => run,
            Ok(None) => return false,
            Err(err) => {
                warn!(error = %err, "failed to claim next queued run");
                return false;
            }
        };

        let workspace_path = match self.store.get_project(run.project_id).await {
            Ok(Some(project)) => PathBuf::from(project.local_path),
            Ok(None) => {
                warn!(run_id = %run.id, project_id = %run.project_id, "run's project vanished");
                PathBuf::from(".")
            }
            Err(err) => {
                warn!(error = %err, "failed to load project for claimed run");
                PathBuf::from(".")
            }
        };

        let run_id = run.id;
        let cancel = self.cancel_registry.token_for(run_id);
        self.active.lock().unwrap().insert(run_id);

        let store = self.store.clone();
        let llm = self.llm.clone();
        let workflows = self.workflows.clone();
        let cancel_registry = self.cancel_registry.clone();
        let executor_config = self.executor_config.clone();

        tokio::spawn(async move {
            info!(run_id = %run_id, "starting run");
            let executor = AgentExecutor::new(&*store, &*llm, &workflows, executor_config);
            if let Err(err) = executor.execute(&run, &workspace_path, cancel).await {
                info!(run_id = %run_id, %err, "run ended");
            }
        });

        // The spawned task owns the rest of this Run's lifecycle; this
        // worker only needs to forget the bookkeeping once it is done. We
        // can't await the task here without serializing claims, so a
        // second short-lived task does the cleanup once the first resolves.
        let store_for_cleanup = self.store.clone();
        let active_for_cleanup = self.active.clone();
        tokio::spawn(cleanup_when_terminal(
            store_for_cleanup,
            run_id,
            cancel_registry,
            active_for_cleanup,
        ));

        true
    }

    async fn wait_for_drain(&self) {
        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace_period;
        while tokio::time::Instant::now() < deadline {
            if self.active.lock().unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        warn!(
            remaining = self.active.lock().unwrap().len(),
            "shutdown grace period elapsed with runs still active"
        );
    }
}

/// Polls until a Run reaches a terminal status, then removes its
/// bookkeeping. A spawned run cannot notify the worker directly without
/// making `AgentExecutor` aware of worker internals, so this watches the
/// store instead, the same way the Workflow Engine watches it for pauses.
async fn cleanup_when_terminal(
    store: Arc<dyn Store>,
    run_id: RunId,
    cancel_registry: Arc<RunCancelRegistry>,
    active: Arc<Mutex<HashSet<RunId>>>,
) {
    loop {
        match store.get_run(run_id).await {
            Ok(Some(run)) if run.status.is_terminal() => break,
            Ok(Some(_)) => tokio::time::sleep(Duration::from_millis(150)).await,
            _ => break,
        }
    }
    cancel_registry.remove(run_id);
    active.lock().unwrap().remove(&run_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_runner_llm::{LlmError, LlmRequest, LlmResponse, ProviderEvent};
    use agent_runner_store::{InMemoryStore, RunStatus, RunType};
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
            unreachable!("test runs only exercise the simple path")
        }

        fn name(&self) -> &str {
            "null"
        }
    }

    fn worker() -> Worker {
        Worker::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(NullBackend),
            Arc::new(WorkflowRegistry::new()),
            Arc::new(RunCancelRegistry::new()),
            ExecutorConfig {
                simple_phase_delay: Duration::from_millis(1),
                ..ExecutorConfig::default()
            },
            WorkerConfig {
                check_interval: Duration::from_millis(10),
                ..WorkerConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn process_once_returns_false_when_queue_empty() {
        let worker = worker();
        assert!(!worker.process_once().await);
    }

    #[tokio::test]
    async fn process_once_claims_and_runs_a_queued_run() {
        let worker = worker();
        let project = worker.store.create_project("demo", "/tmp/demo").await.unwrap();
        let run = worker
            .store
            .create_run(project.id, "hi", None, RunType::Agent, JsonValue::Null, JsonValue::Null)
            .await
            .unwrap();

        assert!(worker.process_once().await);

        // Give the spawned execution task a moment to finish.
        for _ in 0..50 {
            if worker
                .store
                .get_run(run.id)
                .await
                .unwrap()
                .unwrap()
                .status
                .is_terminal()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let updated = worker.store.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(updated.status, RunStatus::Completed);
    }
}
