//! Shared application state handed to every handler.

use agent_runner_executor::ExecutorConfig;
use agent_runner_llm::{LlmBackend, OllamaBackend};
use agent_runner_store::Store;
use agent_runner_worker::{RunCancelRegistry, Worker};
use agent_runner_workflow::WorkflowRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub llm: Arc<dyn LlmBackend>,
    pub workflows: Arc<WorkflowRegistry>,
    pub cancel_registry: Arc<RunCancelRegistry>,
    pub worker: Arc<Worker>,
    pub executor_config: ExecutorConfig,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        ollama_base_url: String,
        ollama_heartbeat_interval: std::time::Duration,
        executor_config: ExecutorConfig,
        worker_config: agent_runner_worker::WorkerConfig,
    ) -> Self {
        let llm: Arc<dyn LlmBackend> =
            Arc::new(OllamaBackend::new(ollama_base_url, ollama_heartbeat_interval));
        let workflows = Arc::new(WorkflowRegistry::new());
        let cancel_registry = Arc::new(RunCancelRegistry::new());

        let worker = Arc::new(Worker::new(
            store.clone(),
            llm.clone(),
            workflows.clone(),
            cancel_registry.clone(),
            executor_config.clone(),
            worker_config,
        ));

        Self {
            store,
            llm,
            workflows,
            cancel_registry,
            worker,
            executor_config,
        }
    }
}
