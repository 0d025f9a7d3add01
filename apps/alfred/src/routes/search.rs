use axum::{extract::State, Json};
use serde::Deserialize;

use crate::errors::AppError;
use crate::ranking::ArtifactMatch;
use crate::routes::jobs::MAX_TOP_K;
use crate::state::AppState;

const DEFAULT_SEARCH_TOP_K: usize = 3;

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: Option<usize>,
}

/// POST /api/v1/search
pub async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Vec<ArtifactMatch>>, AppError> {
    if req.query.trim().is_empty() {
        return Err(AppError::Validation("query must not be empty".to_string()));
    }
    let top_k = req.top_k.unwrap_or(DEFAULT_SEARCH_TOP_K).clamp(1, MAX_TOP_K);
    Ok(Json(state.pipeline.search_artifacts(&req.query, top_k).await?))
}
