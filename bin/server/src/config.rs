//! Server configuration, loaded from environment variables via the `config`
//! crate.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL connection URL. When unset, the server falls back to an
    /// in-memory store, which is useful for local exploration but does not
    /// survive a restart.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Seconds the Background Worker sleeps between claim attempts once the
    /// queue runs dry.
    #[serde(default = "default_worker_check_interval")]
    pub worker_check_interval: u64,

    /// Max Runs the Background Worker claims and starts per tick.
    #[serde(default = "default_worker_batch_size")]
    pub worker_batch_size: usize,

    /// When true, the Background Worker's loop is never started; Runs can
    /// still be advanced via `POST /worker/process`.
    #[serde(default)]
    pub disable_worker: bool,

    /// Base URL of the Ollama server the LLM Provider talks to.
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    /// Seconds between `LLM_HEARTBEAT` events while a generation is in
    /// flight.
    #[serde(default = "default_ollama_heartbeat_interval")]
    pub ollama_heartbeat_interval: u64,

    /// Seconds before an LLM generation call is abandoned as timed out.
    #[serde(default = "default_ollama_timeout_seconds")]
    pub ollama_timeout_seconds: u64,

    /// Default model for the `planner` role.
    #[serde(default = "default_planner_model")]
    pub ollama_planner_model: String,

    /// Default model for the `coder` role.
    #[serde(default = "default_coder_model")]
    pub ollama_coder_model: String,

    /// Comma-separated list of origins allowed by CORS; `*` allows any.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_worker_check_interval() -> u64 {
    5
}

fn default_worker_batch_size() -> usize {
    1
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_heartbeat_interval() -> u64 {
    15
}

fn default_ollama_timeout_seconds() -> u64 {
    120
}

fn default_planner_model() -> String {
    "llama3".to_string()
}

fn default_coder_model() -> String {
    "codellama".to_string()
}

fn default_cors_origins() -> String {
    "*".to_string()
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a recognized variable is set but fails to parse
    /// as its expected type.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }

    #[must_use]
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_origin_list_splits_and_trims() {
        let config = ServerConfig {
            database_url: None,
            bind_addr: default_bind_addr(),
            worker_check_interval: default_worker_check_interval(),
            worker_batch_size: default_worker_batch_size(),
            disable_worker: false,
            ollama_base_url: default_ollama_base_url(),
            ollama_heartbeat_interval: default_ollama_heartbeat_interval(),
            ollama_timeout_seconds: default_ollama_timeout_seconds(),
            ollama_planner_model: default_planner_model(),
            ollama_coder_model: default_coder_model(),
            cors_origins: " https://a.example, https://b.example ".to_string(),
        };

        assert_eq!(
            config.cors_origin_list(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}
