use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::queue::Stage;

/// Errors raised by pipeline stages.
///
/// Provider variants are transient: the stage can be retried and no
/// persisted state was changed. An empty artifact corpus is not an error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Document generator unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Job source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Text extraction failed: {0}")]
    ExtractionFailure(String),

    #[error("Stage '{stage}' for job {job_id} is already claimed by another worker")]
    DuplicateClaim { job_id: Uuid, stage: Stage },

    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Job {0} has no match score yet")]
    NotScored(Uuid),

    #[error("Job {0} has not been parsed yet")]
    NotParsed(Uuid),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl PipelineError {
    /// True for provider failures that a later retry may clear.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::EmbeddingUnavailable(_)
                | PipelineError::GenerationUnavailable(_)
                | PipelineError::SourceUnavailable(_)
        )
    }
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream provider unavailable: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::JobNotFound(_) => AppError::NotFound(err.to_string()),
            PipelineError::NotScored(_)
            | PipelineError::NotParsed(_)
            | PipelineError::ExtractionFailure(_) => {
                AppError::UnprocessableEntity(err.to_string())
            }
            PipelineError::DuplicateClaim { .. } => AppError::Conflict(err.to_string()),
            PipelineError::EmbeddingUnavailable(_)
            | PipelineError::GenerationUnavailable(_)
            | PipelineError::SourceUnavailable(_) => AppError::Upstream(err.to_string()),
            PipelineError::Store(e) => AppError::Internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Upstream(msg) => {
                tracing::warn!("Upstream provider error: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "UPSTREAM_UNAVAILABLE",
                    msg.clone(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
