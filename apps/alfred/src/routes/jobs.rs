use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::generated::{DocumentKind, GeneratedArtifact, Variant};
use crate::models::job::{Job, RawPosting};
use crate::pipeline::JobView;
use crate::ranking::{ArtifactMatch, MatchReport};
use crate::state::AppState;
use crate::store::UpsertOutcome;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;
pub const MAX_TOP_K: usize = 50;

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub source_url: Option<String>,
    pub description: String,
}

impl CreateJobRequest {
    /// Keyed by URL when one is given, otherwise by content, under `manual:`.
    fn into_posting(self) -> RawPosting {
        let mut posting = RawPosting {
            source_id: String::new(),
            source_url: self.source_url.filter(|u| !u.trim().is_empty()),
            title: self.title,
            company: self.company,
            location: self.location,
            description: self.description,
        };
        posting.source_id = match &posting.source_url {
            Some(url) => format!("manual:{}", url.trim()),
            None => format!("manual:{}", &posting.fingerprint()[..16]),
        };
        posting
    }
}

#[derive(Deserialize)]
pub struct MatchRequest {
    pub title: String,
    pub company: Option<String>,
    pub description: String,
    pub top_k: Option<usize>,
}

#[derive(Deserialize)]
pub struct TailorRequest {
    /// Falls back to the configured default persona.
    pub persona: Option<String>,
    pub kind: DocumentKind,
}

#[derive(Serialize)]
pub struct TailorResponse {
    pub generated_id: Uuid,
}

/// GET /api/v1/jobs
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<Job>>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    Ok(Json(state.pipeline.jobs().list_jobs(limit).await?))
}

/// POST /api/v1/jobs
///
/// 201 for a new job, 200 when the posting was already known.
pub async fn handle_create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<Job>), AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("title must not be empty".to_string()));
    }
    if req.description.trim().is_empty() {
        return Err(AppError::Validation("description must not be empty".to_string()));
    }
    let outcome = state.pipeline.submit_posting(&req.into_posting()).await?;
    let status = match outcome {
        UpsertOutcome::Inserted(_) => StatusCode::CREATED,
        UpsertOutcome::Updated { .. } | UpsertOutcome::Unchanged(_) => StatusCode::OK,
    };
    let id = outcome.job_id();
    let job = state
        .pipeline
        .jobs()
        .get_job(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
    Ok((status, Json(job)))
}

/// POST /api/v1/jobs/match
///
/// Ranks a pasted posting against the corpus without storing it.
pub async fn handle_match(
    State(state): State<AppState>,
    Json(req): Json<MatchRequest>,
) -> Result<Json<Vec<ArtifactMatch>>, AppError> {
    if req.description.trim().is_empty() {
        return Err(AppError::Validation("description must not be empty".to_string()));
    }
    let top_k = req
        .top_k
        .unwrap_or(state.pipeline.settings().rank.top_k)
        .clamp(1, MAX_TOP_K);
    let text = format!(
        "{}\n{}\n{}",
        req.title,
        req.company.as_deref().unwrap_or(""),
        req.description
    );
    Ok(Json(state.pipeline.match_posting(&text, top_k).await?))
}

/// GET /api/v1/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobView>, AppError> {
    Ok(Json(state.pipeline.job_view(id).await?))
}

/// POST /api/v1/jobs/:id/rank
pub async fn handle_rank(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchReport>, AppError> {
    Ok(Json(state.pipeline.rank_on_demand(id).await?))
}

/// POST /api/v1/jobs/:id/tailor
pub async fn handle_tailor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TailorRequest>,
) -> Result<(StatusCode, Json<TailorResponse>), AppError> {
    let persona = match req.persona.map(|p| p.trim().to_string()) {
        Some(p) if !p.is_empty() => p,
        _ => state.pipeline.settings().default_persona.clone(),
    };
    let variant = Variant {
        persona,
        kind: req.kind,
    };
    let generated_id = state.pipeline.tailor_on_demand(id, &variant).await?;
    Ok((StatusCode::CREATED, Json(TailorResponse { generated_id })))
}

/// GET /api/v1/jobs/:id/generated
pub async fn handle_list_generated(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<GeneratedArtifact>>, AppError> {
    if state.pipeline.jobs().get_job(id).await?.is_none() {
        return Err(AppError::NotFound(format!("Job {id} not found")));
    }
    Ok(Json(state.pipeline.generated().list_generated(id).await?))
}
