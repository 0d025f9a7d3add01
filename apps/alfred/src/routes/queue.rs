use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::queue::{Stage, WorkItem, WorkStatus};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StatusQuery {
    pub status: Option<WorkStatus>,
}

/// GET /api/v1/queue?status=failed
///
/// Defaults to failed items: the ones waiting on a retry or an operator.
pub async fn handle_list_queue(
    State(state): State<AppState>,
    Query(params): Query<StatusQuery>,
) -> Result<Json<Vec<WorkItem>>, AppError> {
    let status = params.status.unwrap_or(WorkStatus::Failed);
    Ok(Json(state.pipeline.queue().list_by_status(status).await?))
}

fn parse_stage(raw: &str) -> Result<Stage, AppError> {
    raw.parse::<Stage>().map_err(AppError::Validation)
}

/// POST /api/v1/queue/:job_id/:stage/reset
///
/// Only done or failed items can be reset; live items belong to their worker.
pub async fn handle_reset(
    State(state): State<AppState>,
    Path((job_id, stage)): Path<(Uuid, String)>,
) -> Result<StatusCode, AppError> {
    let stage = parse_stage(&stage)?;
    let queue = state.pipeline.queue();
    let item = queue
        .items_for_job(job_id)
        .await?
        .into_iter()
        .find(|item| item.stage == stage)
        .ok_or_else(|| AppError::NotFound(format!("No {stage} item for job {job_id}")))?;
    if !item.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "{stage} for job {job_id} is {}; only done or failed items can be reset",
            item.status
        )));
    }
    if queue.reset(job_id, stage).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Conflict(format!(
            "{stage} for job {job_id} changed while resetting"
        )))
    }
}

/// DELETE /api/v1/queue/:job_id/:stage
pub async fn handle_remove(
    State(state): State<AppState>,
    Path((job_id, stage)): Path<(Uuid, String)>,
) -> Result<StatusCode, AppError> {
    let stage = parse_stage(&stage)?;
    if state.pipeline.queue().remove(job_id, stage).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("No {stage} item for job {job_id}")))
    }
}
