//! Core domain types and utilities for the agent-runner control plane.
//!
//! This crate provides the foundational types, error handling, and shared
//! ID types used throughout the control plane: the API, the background
//! worker, the workflow engine, and the LLM provider adapter all depend on
//! it and nothing else in the workspace.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{EventId, ParseIdError, ProjectId, RunId};
