//! Model override resolution for `LLM_GENERATE` steps.
//!
//! Precedence, highest first: `options.models.{role}` on the Run, then the
//! matching `OLLAMA_{ROLE}_MODEL` environment variable, then the step's own
//! declared model, then the engine's configured default.

use serde_json::Value as JsonValue;

#[must_use]
pub fn resolve_model(
    step_model: Option<&str>,
    role: Option<&str>,
    options: &JsonValue,
    default_model: &str,
) -> String {
    if let Some(role) = role {
        if let Some(model) = options
            .get("models")
            .and_then(|models| models.get(role))
            .and_then(JsonValue::as_str)
        {
            return model.to_string();
        }

        let env_key = format!("OLLAMA_{}_MODEL", role.to_uppercase());
        if let Ok(value) = std::env::var(&env_key) {
            if !value.is_empty() {
                return value;
            }
        }
    }

    step_model
        .map(str::to_string)
        .unwrap_or_else(|| default_model.to_string())
}
