//! LLM backend adapter for the agent-runner control plane.
//!
//! Defines the [`LlmBackend`] trait every concrete provider implements, the
//! [`ProviderEvent`] vocabulary a `generate` call reports along the way, and
//! [`OllamaBackend`], the concrete backend used when `OLLAMA_BASE_URL` is
//! configured.

pub mod backend;
pub mod error;
pub mod heartbeat;
pub mod ollama;

pub use backend::{
    LlmBackend, LlmMessage, LlmRequest, LlmResponse, MessageRole, ProviderEvent, TokenUsage,
};
pub use error::LlmError;
pub use heartbeat::run_with_heartbeat;
pub use ollama::OllamaBackend;
