//! The [`LlmBackend`] trait and the request/response types every backend
//! speaks, plus the [`ProviderEvent`]s a `generate` call emits along the way.

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Role of a single message in a chat-style prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single message in a chat-style prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
}

impl LlmMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// A request to generate a completion.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<LlmMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<LlmMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Token accounting reported by the provider, where available.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A completed generation.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// Progress events a backend reports while a [`LlmBackend::generate`] call is
/// in flight, forwarded verbatim onto the owning Run's event log by the
/// caller under the `LLM_*` event types.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// The backend is pulling or warming up the requested model.
    LoadingModel,
    /// Generation has started.
    Generating,
    /// A periodic liveness signal while generation is still in flight.
    Heartbeat { elapsed_secs: f64 },
    /// Generation finished (successfully or not); this is the last event
    /// a single call will ever emit through `on_event`.
    Done { elapsed_secs: f64 },
}

/// A source of completions.
///
/// Implementations own their own heartbeat cadence: `generate` must keep
/// emitting `Heartbeat` events to `on_event` roughly every interval the
/// backend was configured with for as long as the call is outstanding, stop
/// emitting them before returning, and return promptly once `cancel` is
/// signalled or `timeout` elapses, reporting elapsed time on any non-success
/// outcome.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(
        &self,
        request: &LlmRequest,
        timeout: Duration,
        cancel: CancellationToken,
        on_event: &(dyn Fn(ProviderEvent) + Send + Sync),
    ) -> Result<LlmResponse, LlmError>;

    /// Human-readable backend name, used in error messages and logs.
    fn name(&self) -> &str;
}
