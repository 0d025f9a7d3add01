//! Persistence seams. `PgStore` backs the service; `MemoryStore` backs tests.
//!
//! Every method is a single atomic mutation as seen by other callers: one SQL
//! statement or one transaction in Postgres, one critical section in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::artifact::{Artifact, NewArtifact};
use crate::models::generated::GeneratedArtifact;
use crate::models::job::{Job, ParsedPosting, RawPosting, RefetchPolicy};
use crate::models::queue::{ClaimOutcome, Stage, WorkItem, WorkStatus};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[cfg(test)]
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// What `upsert_posting` did with a fetched posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(Uuid),
    /// Content fingerprint changed. `derived_cleared` is true when the refetch
    /// policy wiped parsed fields, embedding and score.
    Updated { id: Uuid, derived_cleared: bool },
    Unchanged(Uuid),
}

impl UpsertOutcome {
    pub fn job_id(&self) -> Uuid {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Unchanged(id) => *id,
            UpsertOutcome::Updated { id, .. } => *id,
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts by `source_id`, or updates an existing job in place. Never
    /// creates a second row for a known `source_id`.
    async fn upsert_posting(
        &self,
        posting: &RawPosting,
        policy: RefetchPolicy,
    ) -> anyhow::Result<UpsertOutcome>;

    async fn get_job(&self, id: Uuid) -> anyhow::Result<Option<Job>>;

    /// Newest first.
    async fn list_jobs(&self, limit: i64) -> anyhow::Result<Vec<Job>>;

    async fn set_parsed(&self, id: Uuid, parsed: &ParsedPosting) -> anyhow::Result<()>;

    /// First writer wins: stores `embedding` only if none is cached and
    /// returns whatever is cached afterwards.
    async fn cache_description_embedding(
        &self,
        id: Uuid,
        embedding: &[f32],
    ) -> anyhow::Result<Vec<f32>>;

    async fn set_match_score(&self, id: Uuid, score: f64) -> anyhow::Result<()>;

    /// Parsed jobs without a match score, oldest first.
    async fn unscored_job_ids(&self) -> anyhow::Result<Vec<Uuid>>;
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Ordered by id.
    async fn list_artifacts(&self) -> anyhow::Result<Vec<Artifact>>;

    async fn get_artifact(&self, id: Uuid) -> anyhow::Result<Option<Artifact>>;

    async fn create_artifact(&self, new: &NewArtifact) -> anyhow::Result<Artifact>;

    /// Profile edit: bumps the revision and drops the cached embedding.
    async fn update_artifact_content(
        &self,
        id: Uuid,
        content: &str,
    ) -> anyhow::Result<Option<Artifact>>;

    /// Writes only while the artifact is still at `revision`. Returns false
    /// when the write was discarded as stale.
    async fn store_embedding(
        &self,
        id: Uuid,
        revision: i32,
        embedding: &[f32],
    ) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Inserts a pending item. Resets a done or failed item to pending with
    /// zero attempts. Leaves pending and in-progress items alone.
    async fn enqueue(&self, job_id: Uuid, stage: Stage) -> anyhow::Result<()>;

    /// Atomic `pending -> in_progress` transition.
    async fn claim(&self, job_id: Uuid, stage: Stage, worker: &str)
        -> anyhow::Result<ClaimOutcome>;

    /// Claims the oldest pending item of `stage`, skipping rows other
    /// workers are claiming concurrently.
    async fn claim_next(&self, stage: Stage, worker: &str) -> anyhow::Result<Option<WorkItem>>;

    /// Marks the item done and enqueues `next` in the same transaction.
    /// Returns false if `worker` no longer owns the in-progress item.
    async fn complete(
        &self,
        job_id: Uuid,
        stage: Stage,
        worker: &str,
        next: Option<Stage>,
    ) -> anyhow::Result<bool>;

    /// Returns false if `worker` no longer owns the in-progress item.
    async fn fail(
        &self,
        job_id: Uuid,
        stage: Stage,
        worker: &str,
        error: &str,
    ) -> anyhow::Result<bool>;

    /// Explicit retry: failed or done back to pending. Returns false when the
    /// item is missing or not in a terminal state.
    async fn reset(&self, job_id: Uuid, stage: Stage) -> anyhow::Result<bool>;

    async fn remove(&self, job_id: Uuid, stage: Stage) -> anyhow::Result<bool>;

    /// In-progress items claimed before `cutoff` become failed. Returns the
    /// affected items.
    async fn reconcile_stale(&self, cutoff: DateTime<Utc>) -> anyhow::Result<Vec<WorkItem>>;

    /// Failed items with fewer than `max_attempts` attempts go back to pending.
    async fn requeue_failed(&self, max_attempts: i32) -> anyhow::Result<u64>;

    async fn items_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<WorkItem>>;

    async fn list_by_status(&self, status: WorkStatus) -> anyhow::Result<Vec<WorkItem>>;
}

#[async_trait]
pub trait GeneratedStore: Send + Sync {
    async fn insert_generated(&self, generated: &GeneratedArtifact) -> anyhow::Result<()>;

    /// Oldest first.
    async fn list_generated(&self, job_id: Uuid) -> anyhow::Result<Vec<GeneratedArtifact>>;
}
