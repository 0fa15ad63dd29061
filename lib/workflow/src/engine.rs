//! Linear execution of a [`Workflow`] against a Run's event log.
//!
//! Each step emits `STEP_STARTED` before it runs and exactly one of
//! `STEP_COMPLETED` / `STEP_FAILED` after, mirroring the
//! `WORKFLOW_STARTED` / `WORKFLOW_COMPLETED` / `WORKFLOW_FAILED` events that
//! bookend the whole run. A failed or cancelled step stops the workflow;
//! steps never run concurrently with each other.

use crate::error::{StepError, WorkflowError};
use crate::model::{StepType, Workflow};
use crate::resolve::resolve_model;
use agent_runner_core::RunId;
use agent_runner_llm::{LlmBackend, LlmMessage, LlmRequest, ProviderEvent};
use agent_runner_store::{event_type, RunStatus, Store};
use serde_json::{json, Value as JsonValue};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

/// Bound on captured shell stdout/stderr kept in `STEP_COMPLETED`/`STEP_FAILED`
/// payloads. Output beyond this is dropped, not buffered; the full output is
/// never recoverable from the event log past this point.
pub const SHELL_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

/// Engine-wide defaults, overridable per step or per Run.
pub struct EngineConfig {
    pub default_model: String,
    pub default_step_timeout: Duration,
    pub heartbeat_interval: Duration,
}

/// Runs every step of `workflow` in order against `run_id`'s event log.
///
/// `workspace_path` is the Project's workspace directory; `FileWrite` steps
/// may only write inside it. Returns `Ok(())` if every step completed, or
/// the first step's error if one failed, was cancelled, or timed out.
pub async fn execute_workflow(
    workflow: &Workflow,
    run_id: RunId,
    workspace_path: &Path,
    options: &JsonValue,
    llm: &dyn LlmBackend,
    store: &dyn Store,
    cancel: &CancellationToken,
    config: &EngineConfig,
) -> Result<(), WorkflowError> {
    store
        .append_event(
            run_id,
            event_type::WORKFLOW_STARTED,
            json!({ "workflow_name": workflow.name, "step_count": workflow.steps.len() }),
        )
        .await
        .ok();

    for step in &workflow.steps {
        wait_while_paused(store, run_id, cancel).await;

        if cancel.is_cancelled() {
            let err = StepError::Cancelled { elapsed_secs: 0.0 };
            fail_workflow(store, run_id, &step.name, err.clone()).await;
            return Err(WorkflowError::StepFailed {
                step_name: step.name.clone(),
                source: err,
            });
        }

        store
            .append_event(
                run_id,
                event_type::STEP_STARTED,
                json!({ "step_name": step.name }),
            )
            .await
            .ok();

        let timeout = step
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(config.default_step_timeout);

        let outcome =
            run_step(step, workspace_path, options, llm, store, run_id, cancel, config, timeout).await;

        match outcome {
            Ok(payload) => {
                store
                    .append_event(run_id, event_type::STEP_COMPLETED, payload)
                    .await
                    .ok();
            }
            Err(err) => {
                fail_workflow(store, run_id, &step.name, err.clone()).await;
                return Err(WorkflowError::StepFailed {
                    step_name: step.name.clone(),
                    source: err,
                });
            }
        }
    }

    store
        .append_event(
            run_id,
            event_type::WORKFLOW_COMPLETED,
            json!({ "workflow_name": workflow.name }),
        )
        .await
        .ok();

    Ok(())
}

/// Blocks between steps while the Run is PAUSED, polling the store rather
/// than holding a lock, since pausing is a cooperative, best-effort yield
/// rather than a hard guarantee mid-step.
async fn wait_while_paused(store: &dyn Store, run_id: RunId, cancel: &CancellationToken) {
    loop {
        match store.get_run(run_id).await {
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

async fn fail_workflow(store: &dyn Store, run_id: RunId, step_name: &str, err: StepError) {
    store
        .append_event(
            run_id,
            event_type::STEP_FAILED,
            json!({ "step_name": step_name, "kind": err.kind(), "message": err.to_string() }),
        )
        .await
        .ok();
    store
        .append_event(
            run_id,
            event_type::WORKFLOW_FAILED,
            json!({ "step_name": step_name, "kind": err.kind() }),
        )
        .await
        .ok();
}

#[allow(clippy::too_many_arguments)]
async fn run_step(
    step: &crate::model::Step,
    workspace_path: &Path,
    options: &JsonValue,
    llm: &dyn LlmBackend,
    store: &dyn Store,
    run_id: RunId,
    cancel: &CancellationToken,
    config: &EngineConfig,
    timeout: Duration,
) -> Result<JsonValue, StepError> {
    match &step.step_type {
        StepType::LlmGenerate { prompt, model, role } => {
            run_llm_step(
                prompt,
                model.as_deref(),
                role.as_deref(),
                options,
                llm,
                store,
                run_id,
                cancel,
                config,
                timeout,
            )
            .await
        }
        StepType::Shell { command, args } => {
            run_shell_step(command, args, workspace_path, cancel, timeout).await
        }
        StepType::FileWrite { path, content } => run_file_write_step(path, content, workspace_path).await,
    }
}

/// Maps a provider's progress event onto the `LLM_*` event type and payload
/// it is logged under.
fn provider_event_log(event: &ProviderEvent) -> (&'static str, JsonValue) {
    match event {
        ProviderEvent::LoadingModel => (event_type::LLM_LOADING_MODEL, json!({})),
        ProviderEvent::Generating => (event_type::LLM_GENERATING, json!({})),
        ProviderEvent::Heartbeat { elapsed_secs } => {
            (event_type::LLM_HEARTBEAT, json!({ "elapsed_secs": elapsed_secs }))
        }
        ProviderEvent::Done { elapsed_secs } => {
            (event_type::LLM_DONE, json!({ "elapsed_secs": elapsed_secs }))
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_llm_step(
    prompt: &str,
    step_model: Option<&str>,
    role: Option<&str>,
    options: &JsonValue,
    llm: &dyn LlmBackend,
    store: &dyn Store,
    run_id: RunId,
    cancel: &CancellationToken,
    config: &EngineConfig,
    timeout: Duration,
) -> Result<JsonValue, StepError> {
    let model = resolve_model(step_model, role, options, &config.default_model);
    let request = LlmRequest::new(model.clone(), vec![LlmMessage::user(prompt)]);

    // `on_event` must be a plain sync `Fn`, so provider events are buffered
    // here and forwarded to the Run's event log once `generate` returns
    // rather than awaited from inside the callback itself.
    let captured: Mutex<Vec<ProviderEvent>> = Mutex::new(Vec::new());
    let on_event = |event: ProviderEvent| captured.lock().unwrap().push(event);

    let result = llm.generate(&request, timeout, cancel.clone(), &on_event).await;

    for event in captured.into_inner().unwrap() {
        let (kind, payload) = provider_event_log(&event);
        store.append_event(run_id, kind, payload).await.ok();
    }

    let response = result.map_err(|e| StepError::LlmFailed { reason: e.to_string() })?;
    Ok(json!({ "model": model, "output": response.content }))
}

async fn run_shell_step(
    command: &str,
    args: &[String],
    workspace_path: &Path,
    cancel: &CancellationToken,
    timeout: Duration,
) -> Result<JsonValue, StepError> {
    let mut child = tokio::process::Command::new(command)
        .args(args)
        .current_dir(workspace_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| StepError::ShellSpawnFailed { reason: e.to_string() })?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let start = tokio::time::Instant::now();
    tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|e| StepError::ShellSpawnFailed { reason: e.to_string() })?;
            let stdout_text = read_capped(&mut stdout).await;
            let stderr_text = read_capped(&mut stderr).await;

            if status.success() {
                Ok(json!({ "exit_code": status.code(), "stdout": stdout_text, "stderr": stderr_text }))
            } else {
                Err(StepError::ShellFailed { exit_code: status.code(), stderr_tail: stderr_text })
            }
        }
        () = cancel.cancelled() => {
            let _ = child.kill().await;
            Err(StepError::Cancelled { elapsed_secs: start.elapsed().as_secs_f64() })
        }
        () = tokio::time::sleep(timeout) => {
            let _ = child.kill().await;
            Err(StepError::Timeout { elapsed_secs: start.elapsed().as_secs_f64() })
        }
    }
}

async fn read_capped<R: tokio::io::AsyncRead + Unpin>(reader: &mut Option<R>) -> String {
    let Some(reader) = reader else { return String::new() };
    let mut buf = Vec::with_capacity(SHELL_OUTPUT_LIMIT_BYTES.min(4096));
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() < SHELL_OUTPUT_LIMIT_BYTES {
                    let take = n.min(SHELL_OUTPUT_LIMIT_BYTES - buf.len());
                    buf.extend_from_slice(&chunk[..take]);
                }
            }
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn run_file_write_step(
    rel_path: &str,
    content: &str,
    workspace_path: &Path,
) -> Result<JsonValue, StepError> {
    let target = contained_path(workspace_path, rel_path)?;
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StepError::WriteFailed { path: rel_path.to_string(), reason: e.to_string() })?;
    }
    tokio::fs::write(&target, content)
        .await
        .map_err(|e| StepError::WriteFailed { path: rel_path.to_string(), reason: e.to_string() })?;

    Ok(json!({ "path": rel_path, "bytes_written": content.len() }))
}

/// Joins `rel` onto `workspace`, rejecting anything that lexically escapes
/// the workspace directory (`..` components that climb past its root, or an
/// absolute path pointing elsewhere). Does not touch the filesystem, so it
/// works for paths that do not exist yet.
fn contained_path(workspace: &Path, rel: &str) -> Result<PathBuf, StepError> {
    let joined = workspace.join(rel);
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(StepError::BadPath { path: rel.to_string() });
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }

    if !normalized.starts_with(workspace) {
        return Err(StepError::BadPath { path: rel.to_string() });
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Step;
    use agent_runner_llm::{LlmError, LlmResponse};
    use agent_runner_store::InMemoryStore;
    use async_trait::async_trait;

    struct StaticBackend {
        events: Vec<ProviderEvent>,
        reply: &'static str,
    }

    #[async_trait]
    impl LlmBackend for StaticBackend {
        async fn generate(
            &self,
            request: &LlmRequest,
            _timeout: Duration,
            _cancel: CancellationToken,
            on_event: &(dyn Fn(ProviderEvent) + Send + Sync),
        ) -> Result<LlmResponse, LlmError> {
            for event in &self.events {
                on_event(event.clone());
            }
            Ok(LlmResponse {
                content: self.reply.to_string(),
                model: request.model.clone(),
                usage: None,
            })
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    async fn new_run(store: &InMemoryStore) -> RunId {
        let project = store.create_project("demo", "/tmp/demo").await.unwrap();
        let run = store
            .create_run(
                project.id,
                "build a thing",
                None,
                agent_runner_store::RunType::Workflow,
                json!({}),
                json!({}),
            )
            .await
            .unwrap();
        run.id
    }

    fn engine_config() -> EngineConfig {
        EngineConfig {
            default_model: "llama3".to_string(),
            default_step_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(15),
        }
    }

    #[tokio::test]
    async fn shell_and_file_write_steps_run_against_a_real_workspace() {
        let workspace = tempfile::tempdir().unwrap();
        let store = InMemoryStore::new();
        let run_id = new_run(&store).await;

        let workflow = Workflow::new(
            "build",
            vec![
                Step {
                    name: "write-output".to_string(),
                    step_type: StepType::FileWrite {
                        path: "out/result.txt".to_string(),
                        content: "hello workspace".to_string(),
                    },
                    timeout_seconds: None,
                },
                Step {
                    name: "list-files".to_string(),
                    step_type: StepType::Shell {
                        command: "sh".to_string(),
                        args: vec!["-c".to_string(), "cat out/result.txt".to_string()],
                    },
                    timeout_seconds: None,
                },
            ],
        );

        let backend = StaticBackend { events: vec![], reply: "" };
        let cancel = CancellationToken::new();
        execute_workflow(
            &workflow,
            run_id,
            workspace.path(),
            &json!({}),
            &backend,
            &store,
            &cancel,
            &engine_config(),
        )
        .await
        .unwrap();

        let written = tokio::fs::read_to_string(workspace.path().join("out/result.txt"))
            .await
            .unwrap();
        assert_eq!(written, "hello workspace");

        let events = store.list_events(run_id, None, None).await.unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "RUN_CREATED",
                "WORKFLOW_STARTED",
                "STEP_STARTED",
                "STEP_COMPLETED",
                "STEP_STARTED",
                "STEP_COMPLETED",
                "WORKFLOW_COMPLETED",
            ]
        );
    }

    #[tokio::test]
    async fn llm_generate_step_forwards_provider_events_onto_the_run_log() {
        let workspace = tempfile::tempdir().unwrap();
        let store = InMemoryStore::new();
        let run_id = new_run(&store).await;

        let workflow = Workflow::new(
            "summarize",
            vec![Step {
                name: "summarize".to_string(),
                step_type: StepType::LlmGenerate {
                    prompt: "summarize this".to_string(),
                    model: None,
                    role: None,
                },
                timeout_seconds: None,
            }],
        );

        let backend = StaticBackend {
            events: vec![
                ProviderEvent::LoadingModel,
                ProviderEvent::Generating,
                ProviderEvent::Heartbeat { elapsed_secs: 1.5 },
                ProviderEvent::Done { elapsed_secs: 2.0 },
            ],
            reply: "a summary",
        };
        let cancel = CancellationToken::new();
        execute_workflow(
            &workflow,
            run_id,
            workspace.path(),
            &json!({}),
            &backend,
            &store,
            &cancel,
            &engine_config(),
        )
        .await
        .unwrap();

        let events = store.list_events(run_id, None, None).await.unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "RUN_CREATED",
                "WORKFLOW_STARTED",
                "STEP_STARTED",
                "LLM_LOADING_MODEL",
                "LLM_GENERATING",
                "LLM_HEARTBEAT",
                "LLM_DONE",
                "STEP_COMPLETED",
                "WORKFLOW_COMPLETED",
            ]
        );
    }

    #[test]
    fn contained_path_accepts_nested_relative_path() {
        let workspace = Path::new("/workspace/proj");
        let result = contained_path(workspace, "src/main.rs").unwrap();
        assert_eq!(result, Path::new("/workspace/proj/src/main.rs"));
    }

    #[test]
    fn contained_path_rejects_parent_traversal() {
        let workspace = Path::new("/workspace/proj");
        let err = contained_path(workspace, "../../etc/passwd").unwrap_err();
        assert!(matches!(err, StepError::BadPath { .. }));
    }

    #[test]
    fn contained_path_allows_internal_dotdot_that_stays_inside() {
        let workspace = Path::new("/workspace/proj");
        let result = contained_path(workspace, "a/../b.rs").unwrap();
        assert_eq!(result, Path::new("/workspace/proj/b.rs"));
    }
}
