//! Workflow and step definitions.
//!
//! A [`Workflow`] is a fixed, ordered list of [`Step`]s registered by name
//! ahead of time; there is no dynamic graph construction here, since
//! workflows are authored once and run many times unchanged.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a single step does when it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepType {
    /// Ask the LLM Provider to generate text from a prompt.
    LlmGenerate {
        prompt: String,
        /// Model this step prefers, subordinate to the override chain in
        /// [`crate::resolve::resolve_model`].
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        role: Option<String>,
    },
    /// Run a command inside the Run's workspace directory.
    Shell {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Write a file inside the Run's workspace directory.
    FileWrite { path: String, content: String },
}

/// A single step in a [`Workflow`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(flatten)]
    pub step_type: StepType,
    /// Per-step timeout override; falls back to the engine default.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// A named, ordered sequence of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Workflow {
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }
}

/// The set of workflows the Agent Executor can dispatch to by name.
///
/// Registration happens once at process startup; lookups during execution
/// never mutate it, so a plain `HashMap` behind a shared reference is
/// enough.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: HashMap<String, Workflow>,
}

impl WorkflowRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, workflow: Workflow) {
        self.workflows.insert(workflow.name.clone(), workflow);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Workflow> {
        self.workflows.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup_roundtrip() {
        let mut registry = WorkflowRegistry::new();
        registry.register(Workflow::new(
            "deploy",
            vec![Step {
                name: "announce".to_string(),
                step_type: StepType::Shell {
                    command: "echo".to_string(),
                    args: vec!["hi".to_string()],
                },
                timeout_seconds: None,
            }],
        ));

        assert!(registry.contains("deploy"));
        assert!(!registry.contains("missing"));
        assert_eq!(registry.get("deploy").unwrap().steps.len(), 1);
    }

    #[test]
    fn step_type_serde_roundtrip() {
        let step_type = StepType::FileWrite {
            path: "out.txt".to_string(),
            content: "hello".to_string(),
        };
        let json = serde_json::to_string(&step_type).unwrap();
        let back: StepType = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, StepType::FileWrite { .. }));
    }
}
