//! Errors from LLM backend operations.

use std::fmt;

/// Errors returned by [`crate::LlmBackend::generate`].
///
/// `Timeout` and `Cancelled` carry the elapsed time since the call began, so
/// the caller can include it on the terminal event it emits without tracking
/// a second clock.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Provider is unreachable or refused the connection.
    ProviderUnavailable { provider: String, reason: String },
    /// The request itself failed (network error, non-2xx response).
    RequestFailed { reason: String },
    /// The response body could not be parsed as expected.
    ResponseParseFailed { reason: String },
    /// The deadline passed before the provider returned.
    Timeout { elapsed_secs: f64 },
    /// The cancel token was signalled before the provider returned.
    Cancelled { elapsed_secs: f64 },
    /// The provider reported a rate limit.
    RateLimited { retry_after_secs: Option<u64> },
    /// The backend configuration itself is invalid (bad URL, missing model).
    InvalidConfig { reason: String },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderUnavailable { provider, reason } => {
                write!(f, "LLM provider '{provider}' unavailable: {reason}")
            }
            Self::RequestFailed { reason } => write!(f, "LLM request failed: {reason}"),
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse LLM response: {reason}")
            }
            Self::Timeout { elapsed_secs } => {
                write!(f, "LLM request timed out after {elapsed_secs:.1}s")
            }
            Self::Cancelled { elapsed_secs } => {
                write!(f, "LLM request cancelled after {elapsed_secs:.1}s")
            }
            Self::RateLimited { retry_after_secs } => match retry_after_secs {
                Some(secs) => write!(f, "rate limited, retry after {secs}s"),
                None => write!(f, "rate limited"),
            },
            Self::InvalidConfig { reason } => write!(f, "invalid LLM configuration: {reason}"),
        }
    }
}

impl std::error::Error for LlmError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_unavailable_display() {
        let err = LlmError::ProviderUnavailable {
            provider: "ollama".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("ollama"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn timeout_includes_elapsed() {
        let err = LlmError::Timeout { elapsed_secs: 1.2 };
        assert!(err.to_string().contains("1.2"));
    }
}
