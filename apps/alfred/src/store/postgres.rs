use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ArtifactStore, GeneratedStore, JobStore, UpsertOutcome, WorkQueue};
use crate::models::artifact::{Artifact, NewArtifact};
use crate::models::generated::GeneratedArtifact;
use crate::models::job::{Job, ParsedPosting, RawPosting, RefetchPolicy};
use crate::models::queue::{ClaimOutcome, Stage, WorkItem, WorkStatus};

/// Shared between `enqueue` and the next-stage step of `complete`.
const ENQUEUE_SQL: &str = r#"
    INSERT INTO work_items (job_id, stage, status)
    VALUES ($1, $2, 'pending')
    ON CONFLICT (job_id, stage) DO UPDATE
        SET status = 'pending', attempts = 0, worker_id = NULL,
            last_error = NULL, claimed_at = NULL, updated_at = now()
        WHERE work_items.status IN ('done', 'failed')
"#;

const STALE_ERROR: &str = "liveness timeout exceeded";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Row types
// ────────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    source_id: String,
    source_url: Option<String>,
    title: String,
    company: Option<String>,
    location: Option<String>,
    description: String,
    content_fingerprint: String,
    parsed: Option<Json<ParsedPosting>>,
    description_embedding: Option<Vec<f32>>,
    match_score: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            source_id: row.source_id,
            source_url: row.source_url,
            title: row.title,
            company: row.company,
            location: row.location,
            description: row.description,
            content_fingerprint: row.content_fingerprint,
            parsed: row.parsed.map(|Json(p)| p),
            description_embedding: row.description_embedding,
            match_score: row.match_score,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ArtifactRow {
    id: Uuid,
    name: String,
    kind: String,
    content: String,
    source: Option<String>,
    revision: i32,
    embedding: Option<Vec<f32>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ArtifactRow> for Artifact {
    type Error = anyhow::Error;

    fn try_from(row: ArtifactRow) -> Result<Self> {
        Ok(Artifact {
            id: row.id,
            name: row.name,
            kind: row.kind.parse().map_err(|e: String| anyhow!(e))?,
            content: row.content,
            source: row.source,
            revision: row.revision,
            embedding: row.embedding,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct WorkItemRow {
    job_id: Uuid,
    stage: String,
    status: String,
    attempts: i32,
    worker_id: Option<String>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WorkItemRow> for WorkItem {
    type Error = anyhow::Error;

    fn try_from(row: WorkItemRow) -> Result<Self> {
        Ok(WorkItem {
            job_id: row.job_id,
            stage: row.stage.parse().map_err(|e: String| anyhow!(e))?,
            status: row.status.parse().map_err(|e: String| anyhow!(e))?,
            attempts: row.attempts,
            worker_id: row.worker_id,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
            claimed_at: row.claimed_at,
        })
    }
}

#[derive(FromRow)]
struct GeneratedRow {
    id: Uuid,
    job_id: Uuid,
    persona: String,
    kind: String,
    content: String,
    reasoning: String,
    source_artifact_ids: Vec<Uuid>,
    archive_key: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<GeneratedRow> for GeneratedArtifact {
    type Error = anyhow::Error;

    fn try_from(row: GeneratedRow) -> Result<Self> {
        Ok(GeneratedArtifact {
            id: row.id,
            job_id: row.job_id,
            persona: row.persona,
            kind: row.kind.parse().map_err(|e: String| anyhow!(e))?,
            content: row.content,
            reasoning: row.reasoning,
            source_artifact_ids: row.source_artifact_ids,
            archive_key: row.archive_key,
            created_at: row.created_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = anyhow::Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Jobs
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl JobStore for PgStore {
    async fn upsert_posting(
        &self,
        posting: &RawPosting,
        policy: RefetchPolicy,
    ) -> Result<UpsertOutcome> {
        let fingerprint = posting.fingerprint();
        let mut tx = self.pool.begin().await?;

        let existing: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT id, content_fingerprint FROM jobs WHERE source_id = $1 FOR UPDATE",
        )
        .bind(&posting.source_id)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            None => {
                let inserted: Option<Uuid> = sqlx::query_scalar(
                    r#"
                    INSERT INTO jobs
                        (id, source_id, source_url, title, company, location,
                         description, content_fingerprint)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    ON CONFLICT (source_id) DO NOTHING
                    RETURNING id
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(&posting.source_id)
                .bind(&posting.source_url)
                .bind(&posting.title)
                .bind(&posting.company)
                .bind(&posting.location)
                .bind(&posting.description)
                .bind(&fingerprint)
                .fetch_optional(&mut *tx)
                .await?;

                match inserted {
                    Some(id) => UpsertOutcome::Inserted(id),
                    // Lost an insert race; the winner's row stands.
                    None => {
                        let id: Uuid =
                            sqlx::query_scalar("SELECT id FROM jobs WHERE source_id = $1")
                                .bind(&posting.source_id)
                                .fetch_one(&mut *tx)
                                .await?;
                        UpsertOutcome::Unchanged(id)
                    }
                }
            }
            Some((id, stored)) if stored == fingerprint => UpsertOutcome::Unchanged(id),
            Some((id, _)) => {
                let clear = policy == RefetchPolicy::RescoreOnChange;
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET source_url = $2, title = $3, company = $4, location = $5,
                        description = $6, content_fingerprint = $7,
                        parsed = CASE WHEN $8 THEN NULL ELSE parsed END,
                        description_embedding = CASE WHEN $8 THEN NULL ELSE description_embedding END,
                        match_score = CASE WHEN $8 THEN NULL ELSE match_score END,
                        updated_at = now()
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(&posting.source_url)
                .bind(&posting.title)
                .bind(&posting.company)
                .bind(&posting.location)
                .bind(&posting.description)
                .bind(&fingerprint)
                .bind(clear)
                .execute(&mut *tx)
                .await?;
                UpsertOutcome::Updated {
                    id,
                    derived_cleared: clear,
                }
            }
        };

        tx.commit().await?;
        debug!("Upserted {} -> {:?}", posting.source_id, outcome);
        Ok(outcome)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Job::from))
    }

    async fn list_jobs(&self, limit: i64) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> =
            sqlx::query_as("SELECT * FROM jobs ORDER BY created_at DESC, id LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Job::from).collect())
    }

    async fn set_parsed(&self, id: Uuid, parsed: &ParsedPosting) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET parsed = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(Json(parsed))
            .execute(&self.pool)
            .await?;
        anyhow::ensure!(result.rows_affected() == 1, "job {id} not found");
        Ok(())
    }

    async fn cache_description_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<Vec<f32>> {
        let written = sqlx::query(
            r#"
            UPDATE jobs SET description_embedding = $2, updated_at = now()
            WHERE id = $1 AND description_embedding IS NULL
            "#,
        )
        .bind(id)
        .bind(embedding)
        .execute(&self.pool)
        .await?;

        if written.rows_affected() == 1 {
            return Ok(embedding.to_vec());
        }

        let stored: Option<Option<Vec<f32>>> =
            sqlx::query_scalar("SELECT description_embedding FROM jobs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match stored {
            Some(Some(vector)) => Ok(vector),
            Some(None) => Err(anyhow!("embedding for job {id} was cleared concurrently")),
            None => Err(anyhow!("job {id} not found")),
        }
    }

    async fn set_match_score(&self, id: Uuid, score: f64) -> Result<()> {
        let result =
            sqlx::query("UPDATE jobs SET match_score = $2, updated_at = $3 WHERE id = $1")
                .bind(id)
                .bind(score)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
        anyhow::ensure!(result.rows_affected() == 1, "job {id} not found");
        Ok(())
    }

    async fn unscored_job_ids(&self) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM jobs WHERE match_score IS NULL AND parsed IS NOT NULL ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Artifacts
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ArtifactStore for PgStore {
    async fn list_artifacts(&self) -> Result<Vec<Artifact>> {
        let rows: Vec<ArtifactRow> = sqlx::query_as("SELECT * FROM artifacts ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn get_artifact(&self, id: Uuid) -> Result<Option<Artifact>> {
        let row: Option<ArtifactRow> = sqlx::query_as("SELECT * FROM artifacts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Artifact::try_from).transpose()
    }

    async fn create_artifact(&self, new: &NewArtifact) -> Result<Artifact> {
        let row: ArtifactRow = sqlx::query_as(
            r#"
            INSERT INTO artifacts (id, name, kind, content, source)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(new.kind.as_str())
        .bind(&new.content)
        .bind(&new.source)
        .fetch_one(&self.pool)
        .await?;
        info!("Created artifact {} ({})", row.id, row.kind);
        Artifact::try_from(row)
    }

    async fn update_artifact_content(&self, id: Uuid, content: &str) -> Result<Option<Artifact>> {
        let row: Option<ArtifactRow> = sqlx::query_as(
            r#"
            UPDATE artifacts
            SET content = $2, revision = revision + 1, embedding = NULL, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Artifact::try_from).transpose()
    }

    async fn store_embedding(&self, id: Uuid, revision: i32, embedding: &[f32]) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE artifacts SET embedding = $3, updated_at = now()
            WHERE id = $1 AND revision = $2
            "#,
        )
        .bind(id)
        .bind(revision)
        .bind(embedding)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Work queue
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl WorkQueue for PgStore {
    async fn enqueue(&self, job_id: Uuid, stage: Stage) -> Result<()> {
        sqlx::query(ENQUEUE_SQL)
            .bind(job_id)
            .bind(stage.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn claim(&self, job_id: Uuid, stage: Stage, worker: &str) -> Result<ClaimOutcome> {
        let claimed: Option<WorkItemRow> = sqlx::query_as(
            r#"
            UPDATE work_items
            SET status = 'in_progress', worker_id = $3, attempts = attempts + 1,
                claimed_at = now(), updated_at = now()
            WHERE job_id = $1 AND stage = $2 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(stage.as_str())
        .bind(worker)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = claimed {
            return Ok(ClaimOutcome::Claimed(WorkItem::try_from(row)?));
        }

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM work_items WHERE job_id = $1 AND stage = $2")
                .bind(job_id)
                .bind(stage.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(match status {
            None => ClaimOutcome::Missing,
            Some(s) => match s.parse::<WorkStatus>().map_err(|e| anyhow!(e))? {
                WorkStatus::InProgress => ClaimOutcome::Conflict,
                // Raced back to pending between the two statements; treat as lost.
                WorkStatus::Pending => ClaimOutcome::Conflict,
                other => ClaimOutcome::NotPending(other),
            },
        })
    }

    async fn claim_next(&self, stage: Stage, worker: &str) -> Result<Option<WorkItem>> {
        let row: Option<WorkItemRow> = sqlx::query_as(
            r#"
            UPDATE work_items
            SET status = 'in_progress', worker_id = $2, attempts = attempts + 1,
                claimed_at = now(), updated_at = now()
            WHERE status = 'pending' AND (job_id, stage) = (
                SELECT job_id, stage FROM work_items
                WHERE stage = $1 AND status = 'pending'
                ORDER BY updated_at, job_id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(stage.as_str())
        .bind(worker)
        .fetch_optional(&self.pool)
        .await?;
        row.map(WorkItem::try_from).transpose()
    }

    async fn complete(
        &self,
        job_id: Uuid,
        stage: Stage,
        worker: &str,
        next: Option<Stage>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let done = sqlx::query(
            r#"
            UPDATE work_items SET status = 'done', last_error = NULL, updated_at = now()
            WHERE job_id = $1 AND stage = $2 AND status = 'in_progress' AND worker_id = $3
            "#,
        )
        .bind(job_id)
        .bind(stage.as_str())
        .bind(worker)
        .execute(&mut *tx)
        .await?;

        if done.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(next) = next {
            sqlx::query(ENQUEUE_SQL)
                .bind(job_id)
                .bind(next.as_str())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn fail(&self, job_id: Uuid, stage: Stage, worker: &str, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE work_items SET status = 'failed', last_error = $4, updated_at = now()
            WHERE job_id = $1 AND stage = $2 AND status = 'in_progress' AND worker_id = $3
            "#,
        )
        .bind(job_id)
        .bind(stage.as_str())
        .bind(worker)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn reset(&self, job_id: Uuid, stage: Stage) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'pending', attempts = 0, worker_id = NULL, last_error = NULL,
                claimed_at = NULL, updated_at = now()
            WHERE job_id = $1 AND stage = $2 AND status IN ('done', 'failed')
            "#,
        )
        .bind(job_id)
        .bind(stage.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove(&self, job_id: Uuid, stage: Stage) -> Result<bool> {
        let result = sqlx::query("DELETE FROM work_items WHERE job_id = $1 AND stage = $2")
            .bind(job_id)
            .bind(stage.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn reconcile_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(
            r#"
            UPDATE work_items SET status = 'failed', last_error = $2, updated_at = now()
            WHERE status = 'in_progress' AND claimed_at < $1
            RETURNING *
            "#,
        )
        .bind(cutoff)
        .bind(STALE_ERROR)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn requeue_failed(&self, max_attempts: i32) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'pending', worker_id = NULL, claimed_at = NULL, updated_at = now()
            WHERE status = 'failed' AND attempts < $1
            "#,
        )
        .bind(max_attempts)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn items_for_job(&self, job_id: Uuid) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> =
            sqlx::query_as("SELECT * FROM work_items WHERE job_id = $1 ORDER BY created_at, stage")
                .bind(job_id)
                .fetch_all(&self.pool)
                .await?;
        convert_all(rows)
    }

    async fn list_by_status(&self, status: WorkStatus) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(
            "SELECT * FROM work_items WHERE status = $1 ORDER BY updated_at, job_id, stage",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Generated artifacts
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl GeneratedStore for PgStore {
    async fn insert_generated(&self, generated: &GeneratedArtifact) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO generated_artifacts
                (id, job_id, persona, kind, content, reasoning,
                 source_artifact_ids, archive_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(generated.id)
        .bind(generated.job_id)
        .bind(&generated.persona)
        .bind(generated.kind.as_str())
        .bind(&generated.content)
        .bind(&generated.reasoning)
        .bind(&generated.source_artifact_ids)
        .bind(&generated.archive_key)
        .bind(generated.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_generated(&self, job_id: Uuid) -> Result<Vec<GeneratedArtifact>> {
        let rows: Vec<GeneratedRow> = sqlx::query_as(
            "SELECT * FROM generated_artifacts WHERE job_id = $1 ORDER BY created_at, id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }
}
