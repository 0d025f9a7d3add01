pub mod artifacts;
pub mod health;
pub mod jobs;
pub mod pipeline;
pub mod queue;
pub mod search;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Pipeline triggers
        .route("/api/v1/pipeline/fetch", post(pipeline::handle_fetch))
        .route("/api/v1/pipeline/parse", post(pipeline::handle_parse))
        .route("/api/v1/pipeline/reconcile", post(pipeline::handle_reconcile))
        .route("/api/v1/pipeline/backfill", post(pipeline::handle_backfill))
        // Jobs
        .route(
            "/api/v1/jobs",
            get(jobs::handle_list_jobs).post(jobs::handle_create_job),
        )
        .route("/api/v1/jobs/match", post(jobs::handle_match))
        .route("/api/v1/jobs/:id", get(jobs::handle_get_job))
        .route("/api/v1/jobs/:id/rank", post(jobs::handle_rank))
        .route("/api/v1/jobs/:id/tailor", post(jobs::handle_tailor))
        .route("/api/v1/jobs/:id/generated", get(jobs::handle_list_generated))
        // Work queue
        .route("/api/v1/queue", get(queue::handle_list_queue))
        .route("/api/v1/queue/:job_id/:stage", delete(queue::handle_remove))
        .route("/api/v1/queue/:job_id/:stage/reset", post(queue::handle_reset))
        // Artifact corpus
        .route(
            "/api/v1/artifacts",
            get(artifacts::handle_list_artifacts).post(artifacts::handle_create_artifact),
        )
        .route(
            "/api/v1/artifacts/:id",
            get(artifacts::handle_get_artifact).put(artifacts::handle_update_artifact),
        )
        .route("/api/v1/search", post(search::handle_search))
        .with_state(state)
}
