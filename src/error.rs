use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the progression engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Operation attempted on a course whose status does not allow it,
    /// or a redundant completion evaluation.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Serialization failure or deadlock between concurrent writers.
    /// The caller should retry the whole sequence once.
    #[error("concurrent update conflict, please retry")]
    ConcurrencyConflict,

    #[error("persistence error: {0}")]
    Persistence(sqlx::Error),
}

impl EngineError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict)
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidStateTransition(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ConcurrencyConflict => StatusCode::CONFLICT,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        // 40001 = serialization_failure, 40P01 = deadlock_detected
        if let Some(code) = e.as_database_error().and_then(|d| d.code()) {
            if code == "40001" || code == "40P01" {
                return Self::ConcurrencyConflict;
            }
        }
        Self::Persistence(e)
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // No internals in the generic failure notice.
            Self::Persistence(e) => {
                tracing::error!(error = %e, "persistence error");
                "Something went wrong, please try again later".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            EngineError::invalid_state("already completed").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EngineError::NotFound("course").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EngineError::ConcurrencyConflict.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EngineError::Persistence(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(EngineError::ConcurrencyConflict.is_retryable());
        assert!(!EngineError::NotFound("progress").is_retryable());
        assert!(!EngineError::invalid_state("locked").is_retryable());
    }

    #[test]
    fn not_found_message_names_the_entity() {
        assert_eq!(
            EngineError::NotFound("assessment").to_string(),
            "assessment not found"
        );
    }
}
