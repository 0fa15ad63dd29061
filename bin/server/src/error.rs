//! The error taxonomy returned by HTTP handlers, and its mapping onto
//! status codes.
//!
//! Only four status codes appear on this surface: `404` (not found), `409`
//! (illegal transition or name conflict), `422` (bad request body), and
//! `500` (everything else — timeouts, cancellations, provider/shell
//! failures, and genuine bugs are all opaque to the caller).

use agent_runner_store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    NotFound { what: &'static str, id: String },
    Conflict { reason: String },
    Validation { reason: String },
    Internal { reason: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { what, id } => write!(f, "{what} '{id}' not found"),
            Self::Conflict { reason } => write!(f, "conflict: {reason}"),
            Self::Validation { reason } => write!(f, "invalid request: {reason}"),
            Self::Internal { reason } => write!(f, "internal error: {reason}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation { reason: reason.into() }
    }

    #[must_use]
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict { reason: reason.into() }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if matches!(self, Self::Internal { .. }) {
            tracing::error!(error = %self, "internal error");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { what, id } => Self::NotFound { what, id },
            StoreError::NameConflict { name } => {
                Self::Conflict { reason: format!("name '{name}' already in use") }
            }
            StoreError::Backend(e) => Self::Internal { reason: e.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::NotFound { what: "run", id: "run_x".to_string() };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_422() {
        let err = ApiError::validation("goal is required");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = ApiError::conflict("illegal transition");
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
