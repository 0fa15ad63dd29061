//! A [`LlmBackend`] that talks to a local [Ollama](https://ollama.com)
//! server over its HTTP chat API.

use crate::backend::{LlmBackend, LlmMessage, LlmRequest, LlmResponse, MessageRole, ProviderEvent, TokenUsage};
use crate::error::LlmError;
use crate::heartbeat::run_with_heartbeat;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
}

impl From<&LlmMessage> for OllamaMessage {
    fn from(message: &LlmMessage) -> Self {
        Self {
            role: match message.role {
                MessageRole::System => "system",
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            },
            content: message.content.clone(),
        }
    }
}

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize, Default)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

/// Talks to an Ollama server's `/api/chat` endpoint.
///
/// `generate` reports [`ProviderEvent::LoadingModel`] before dispatching the
/// request (Ollama pulls cold models in-band on first use, with no separate
/// progress channel over this API) and relies on
/// [`run_with_heartbeat`](crate::heartbeat::run_with_heartbeat) for the
/// heartbeat/timeout/cancellation contract every backend shares.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    heartbeat_interval: Duration,
}

impl OllamaBackend {
    #[must_use]
    pub fn new(base_url: impl Into<String>, heartbeat_interval: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            heartbeat_interval,
        }
    }

    async fn call(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = OllamaChatRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(OllamaMessage::from).collect(),
            stream: false,
            options: if request.temperature.is_some() || request.max_tokens.is_some() {
                Some(OllamaOptions {
                    temperature: request.temperature,
                    num_predict: request.max_tokens,
                })
            } else {
                None
            },
        };

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ProviderUnavailable {
                provider: "ollama".to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(LlmError::RequestFailed {
                reason: format!("ollama returned status {}", response.status()),
            });
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseParseFailed { reason: e.to_string() })?;

        Ok(LlmResponse {
            content: parsed.message.content,
            model: request.model.clone(),
            usage: Some(TokenUsage {
                prompt_tokens: parsed.prompt_eval_count,
                completion_tokens: parsed.eval_count,
            }),
        })
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn generate(
        &self,
        request: &LlmRequest,
        timeout: Duration,
        cancel: CancellationToken,
        on_event: &(dyn Fn(ProviderEvent) + Send + Sync),
    ) -> Result<LlmResponse, LlmError> {
        on_event(ProviderEvent::LoadingModel);
        on_event(ProviderEvent::Generating);

        run_with_heartbeat(
            self.call(request),
            timeout,
            self.heartbeat_interval,
            cancel,
            on_event,
        )
        .await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_role_mapping() {
        let msg = LlmMessage::system("be terse");
        let ollama: OllamaMessage = (&msg).into();
        assert_eq!(ollama.role, "system");
        assert_eq!(ollama.content, "be terse");
    }

    #[test]
    fn backend_name_is_ollama() {
        let backend = OllamaBackend::new("http://localhost:11434", Duration::from_secs(15));
        assert_eq!(backend.name(), "ollama");
    }
}
