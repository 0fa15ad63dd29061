//! Error types for the store crate.

use agent_runner_core::RunId;
use std::fmt;

/// Errors surfaced by [`crate::Store`] operations.
#[derive(Debug)]
pub enum StoreError {
    /// Referenced Project or Run does not exist.
    NotFound { what: &'static str, id: String },
    /// A Project with this name already exists.
    NameConflict { name: String },
    /// The underlying backend returned an error.
    Backend(sqlx::Error),
}

impl StoreError {
    pub(crate) fn decode(what: &'static str, id: &str, source: impl fmt::Display) -> sqlx::Error {
        sqlx::Error::Decode(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid {what} id '{id}': {source}"),
        )))
    }

    /// Convenience constructor for a missing Run.
    #[must_use]
    pub fn run_not_found(id: RunId) -> Self {
        Self::NotFound {
            what: "run",
            id: id.to_string(),
        }
    }

    /// Convenience constructor for a missing Project.
    #[must_use]
    pub fn project_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            what: "project",
            id: id.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { what, id } => write!(f, "{what} not found: {id}"),
            Self::NameConflict { name } => write!(f, "project name already in use: {name}"),
            Self::Backend(e) => write!(f, "store backend error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Backend(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Backend(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = StoreError::run_not_found(RunId::new());
        assert!(err.to_string().starts_with("run not found"));
    }

    #[test]
    fn name_conflict_display() {
        let err = StoreError::NameConflict {
            name: "demo".to_string(),
        };
        assert!(err.to_string().contains("demo"));
    }
}
