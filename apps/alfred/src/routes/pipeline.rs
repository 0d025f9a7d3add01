use axum::{extract::State, Json};
use serde::Serialize;

use crate::errors::AppError;
use crate::fetch::FetchReport;
use crate::pipeline::{ReconcileReport, StageRunReport};
use crate::state::AppState;

#[derive(Serialize)]
pub struct BackfillResponse {
    pub enqueued: usize,
}

/// POST /api/v1/pipeline/fetch
pub async fn handle_fetch(State(state): State<AppState>) -> Result<Json<FetchReport>, AppError> {
    Ok(Json(state.pipeline.run_fetch().await?))
}

/// POST /api/v1/pipeline/parse
pub async fn handle_parse(
    State(state): State<AppState>,
) -> Result<Json<StageRunReport>, AppError> {
    Ok(Json(state.pipeline.run_parse().await?))
}

/// POST /api/v1/pipeline/reconcile
pub async fn handle_reconcile(
    State(state): State<AppState>,
) -> Result<Json<ReconcileReport>, AppError> {
    Ok(Json(state.pipeline.reconcile().await?))
}

/// POST /api/v1/pipeline/backfill
pub async fn handle_backfill(
    State(state): State<AppState>,
) -> Result<Json<BackfillResponse>, AppError> {
    let enqueued = state.pipeline.backfill_unscored().await?;
    Ok(Json(BackfillResponse { enqueued }))
}
