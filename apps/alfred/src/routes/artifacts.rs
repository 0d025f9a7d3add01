use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::artifact::{Artifact, NewArtifact};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ContentUpdate {
    pub content: String,
}

/// GET /api/v1/artifacts
pub async fn handle_list_artifacts(
    State(state): State<AppState>,
) -> Result<Json<Vec<Artifact>>, AppError> {
    Ok(Json(state.pipeline.artifacts().list_artifacts().await?))
}

/// GET /api/v1/artifacts/:id
pub async fn handle_get_artifact(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Artifact>, AppError> {
    state
        .pipeline
        .artifacts()
        .get_artifact(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Artifact {id} not found")))
}

/// POST /api/v1/artifacts
///
/// The embedding is computed lazily by the next ranking.
pub async fn handle_create_artifact(
    State(state): State<AppState>,
    Json(req): Json<NewArtifact>,
) -> Result<(StatusCode, Json<Artifact>), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }
    if req.content.trim().is_empty() {
        return Err(AppError::Validation("content must not be empty".to_string()));
    }
    let artifact = state.pipeline.artifacts().create_artifact(&req).await?;
    Ok((StatusCode::CREATED, Json(artifact)))
}

/// PUT /api/v1/artifacts/:id
pub async fn handle_update_artifact(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ContentUpdate>,
) -> Result<Json<Artifact>, AppError> {
    if req.content.trim().is_empty() {
        return Err(AppError::Validation("content must not be empty".to_string()));
    }
    state
        .pipeline
        .artifacts()
        .update_artifact_content(id, &req.content)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Artifact {id} not found")))
}
