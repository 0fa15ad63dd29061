//! Parses the recognized keys out of a Run's freeform `options` document.
//!
//! Unrecognized keys are ignored rather than rejected: `options` is an open
//! bag that the Workflow Engine, the LLM Provider, and future executors may
//! all read from independently.

use serde_json::Value as JsonValue;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub workflow_name: Option<String>,
    pub models: JsonValue,
    pub timeout_seconds: Option<u64>,
    pub heartbeat_interval: Option<u64>,
    pub dry_run: bool,
    pub verbose: bool,
    pub max_steps: Option<u32>,
}

impl RunOptions {
    #[must_use]
    pub fn parse(options: &JsonValue) -> Self {
        Self {
            workflow_name: options
                .get("workflow_name")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            models: options.get("models").cloned().unwrap_or(JsonValue::Null),
            timeout_seconds: options.get("timeout_seconds").and_then(JsonValue::as_u64),
            heartbeat_interval: options.get("heartbeat_interval").and_then(JsonValue::as_u64),
            dry_run: options
                .get("dry_run")
                .and_then(JsonValue::as_bool)
                .unwrap_or(false),
            verbose: options
                .get("verbose")
                .and_then(JsonValue::as_bool)
                .unwrap_or(false),
            max_steps: options
                .get("max_steps")
                .and_then(JsonValue::as_u64)
                .map(|v| v as u32),
        }
    }

    #[must_use]
    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_seconds.map(Duration::from_secs).unwrap_or(default)
    }

    #[must_use]
    pub fn heartbeat_interval(&self, default: Duration) -> Duration {
        self.heartbeat_interval
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}
