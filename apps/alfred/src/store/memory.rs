//! In-memory implementation of every store trait. One mutex guards all
//! tables, so each method is a single critical section.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{ArtifactStore, GeneratedStore, JobStore, UpsertOutcome, WorkQueue};
use crate::models::artifact::{Artifact, NewArtifact};
use crate::models::generated::GeneratedArtifact;
use crate::models::job::{Job, ParsedPosting, RawPosting, RefetchPolicy};
use crate::models::queue::{ClaimOutcome, Stage, WorkItem, WorkStatus};

#[derive(Default)]
struct Tables {
    jobs: HashMap<Uuid, Job>,
    artifacts: BTreeMap<Uuid, Artifact>,
    work: BTreeMap<(Uuid, Stage), WorkItem>,
    generated: Vec<GeneratedArtifact>,
    score_writes: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn job_count(&self) -> usize {
        self.lock().jobs.len()
    }

    /// Number of `set_match_score` calls so far.
    pub fn score_writes(&self) -> usize {
        self.lock().score_writes
    }

    /// Moves every claim timestamp back by `by`, simulating a worker that
    /// died long ago.
    pub fn backdate_claims(&self, by: Duration) {
        for item in self.lock().work.values_mut() {
            if let Some(claimed_at) = item.claimed_at {
                item.claimed_at = Some(claimed_at - by);
            }
        }
    }

    /// Inserts an artifact with a fixed id so tests can control tie-breaks.
    pub fn insert_artifact(&self, artifact: Artifact) {
        self.lock().artifacts.insert(artifact.id, artifact);
    }
}

fn claim_item(item: &mut WorkItem, worker: &str) {
    let now = Utc::now();
    item.status = WorkStatus::InProgress;
    item.worker_id = Some(worker.to_string());
    item.attempts += 1;
    item.claimed_at = Some(now);
    item.updated_at = now;
}

fn enqueue_locked(tables: &mut Tables, job_id: Uuid, stage: Stage) {
    let now = Utc::now();
    match tables.work.get_mut(&(job_id, stage)) {
        Some(item) if item.status.is_terminal() => {
            item.status = WorkStatus::Pending;
            item.attempts = 0;
            item.worker_id = None;
            item.last_error = None;
            item.claimed_at = None;
            item.updated_at = now;
        }
        Some(_) => {}
        None => {
            tables.work.insert(
                (job_id, stage),
                WorkItem {
                    job_id,
                    stage,
                    status: WorkStatus::Pending,
                    attempts: 0,
                    worker_id: None,
                    last_error: None,
                    created_at: now,
                    updated_at: now,
                    claimed_at: None,
                },
            );
        }
    }
}

fn owned_in_progress<'a>(
    tables: &'a mut Tables,
    job_id: Uuid,
    stage: Stage,
    worker: &str,
) -> Option<&'a mut WorkItem> {
    tables.work.get_mut(&(job_id, stage)).filter(|item| {
        item.status == WorkStatus::InProgress && item.worker_id.as_deref() == Some(worker)
    })
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn upsert_posting(
        &self,
        posting: &RawPosting,
        policy: RefetchPolicy,
    ) -> Result<UpsertOutcome> {
        let fingerprint = posting.fingerprint();
        let mut tables = self.lock();
        let now = Utc::now();

        let existing = tables
            .jobs
            .values_mut()
            .find(|job| job.source_id == posting.source_id);

        match existing {
            Some(job) if job.content_fingerprint == fingerprint => {
                Ok(UpsertOutcome::Unchanged(job.id))
            }
            Some(job) => {
                job.source_url = posting.source_url.clone();
                job.title = posting.title.clone();
                job.company = posting.company.clone();
                job.location = posting.location.clone();
                job.description = posting.description.clone();
                job.content_fingerprint = fingerprint;
                job.updated_at = now;
                let clear = policy == RefetchPolicy::RescoreOnChange;
                if clear {
                    job.parsed = None;
                    job.description_embedding = None;
                    job.match_score = None;
                }
                Ok(UpsertOutcome::Updated {
                    id: job.id,
                    derived_cleared: clear,
                })
            }
            None => {
                let id = Uuid::new_v4();
                tables.jobs.insert(
                    id,
                    Job {
                        id,
                        source_id: posting.source_id.clone(),
                        source_url: posting.source_url.clone(),
                        title: posting.title.clone(),
                        company: posting.company.clone(),
                        location: posting.location.clone(),
                        description: posting.description.clone(),
                        content_fingerprint: fingerprint,
                        parsed: None,
                        description_embedding: None,
                        match_score: None,
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(UpsertOutcome::Inserted(id))
            }
        }
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    async fn list_jobs(&self, limit: i64) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.lock().jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn set_parsed(&self, id: Uuid, parsed: &ParsedPosting) -> Result<()> {
        let mut tables = self.lock();
        let job = tables.jobs.get_mut(&id).ok_or_else(|| anyhow!("job {id} not found"))?;
        job.parsed = Some(parsed.clone());
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn cache_description_embedding(&self, id: Uuid, embedding: &[f32]) -> Result<Vec<f32>> {
        let mut tables = self.lock();
        let job = tables.jobs.get_mut(&id).ok_or_else(|| anyhow!("job {id} not found"))?;
        let stored = job
            .description_embedding
            .get_or_insert_with(|| embedding.to_vec());
        Ok(stored.clone())
    }

    async fn set_match_score(&self, id: Uuid, score: f64) -> Result<()> {
        let mut tables = self.lock();
        let job = tables.jobs.get_mut(&id).ok_or_else(|| anyhow!("job {id} not found"))?;
        job.match_score = Some(score);
        job.updated_at = Utc::now();
        tables.score_writes += 1;
        Ok(())
    }

    async fn unscored_job_ids(&self) -> Result<Vec<Uuid>> {
        let tables = self.lock();
        let mut unscored: Vec<&Job> = tables
            .jobs
            .values()
            .filter(|job| job.match_score.is_none() && job.parsed.is_some())
            .collect();
        unscored.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(unscored.into_iter().map(|job| job.id).collect())
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn list_artifacts(&self) -> Result<Vec<Artifact>> {
        Ok(self.lock().artifacts.values().cloned().collect())
    }

    async fn get_artifact(&self, id: Uuid) -> Result<Option<Artifact>> {
        Ok(self.lock().artifacts.get(&id).cloned())
    }

    async fn create_artifact(&self, new: &NewArtifact) -> Result<Artifact> {
        let now = Utc::now();
        let artifact = Artifact {
            id: Uuid::new_v4(),
            name: new.name.clone(),
            kind: new.kind,
            content: new.content.clone(),
            source: new.source.clone(),
            revision: 1,
            embedding: None,
            created_at: now,
            updated_at: now,
        };
        self.lock().artifacts.insert(artifact.id, artifact.clone());
        Ok(artifact)
    }

    async fn update_artifact_content(&self, id: Uuid, content: &str) -> Result<Option<Artifact>> {
        let mut tables = self.lock();
        Ok(tables.artifacts.get_mut(&id).map(|artifact| {
            artifact.content = content.to_string();
            artifact.revision += 1;
            artifact.embedding = None;
            artifact.updated_at = Utc::now();
            artifact.clone()
        }))
    }

    async fn store_embedding(&self, id: Uuid, revision: i32, embedding: &[f32]) -> Result<bool> {
        let mut tables = self.lock();
        match tables.artifacts.get_mut(&id) {
            Some(artifact) if artifact.revision == revision => {
                artifact.embedding = Some(embedding.to_vec());
                artifact.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl WorkQueue for MemoryStore {
    async fn enqueue(&self, job_id: Uuid, stage: Stage) -> Result<()> {
        enqueue_locked(&mut self.lock(), job_id, stage);
        Ok(())
    }

    async fn claim(&self, job_id: Uuid, stage: Stage, worker: &str) -> Result<ClaimOutcome> {
        let mut tables = self.lock();
        Ok(match tables.work.get_mut(&(job_id, stage)) {
            None => ClaimOutcome::Missing,
            Some(item) => match item.status {
                WorkStatus::Pending => {
                    claim_item(item, worker);
                    ClaimOutcome::Claimed(item.clone())
                }
                WorkStatus::InProgress => ClaimOutcome::Conflict,
                other => ClaimOutcome::NotPending(other),
            },
        })
    }

    async fn claim_next(&self, stage: Stage, worker: &str) -> Result<Option<WorkItem>> {
        let mut tables = self.lock();
        let next = tables
            .work
            .values_mut()
            .filter(|item| item.stage == stage && item.status == WorkStatus::Pending)
            .min_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.job_id.cmp(&b.job_id)));
        Ok(next.map(|item| {
            claim_item(item, worker);
            item.clone()
        }))
    }

    async fn complete(
        &self,
        job_id: Uuid,
        stage: Stage,
        worker: &str,
        next: Option<Stage>,
    ) -> Result<bool> {
        let mut tables = self.lock();
        let Some(item) = owned_in_progress(&mut tables, job_id, stage, worker) else {
            return Ok(false);
        };
        item.status = WorkStatus::Done;
        item.last_error = None;
        item.updated_at = Utc::now();
        if let Some(next) = next {
            enqueue_locked(&mut tables, job_id, next);
        }
        Ok(true)
    }

    async fn fail(&self, job_id: Uuid, stage: Stage, worker: &str, error: &str) -> Result<bool> {
        let mut tables = self.lock();
        let Some(item) = owned_in_progress(&mut tables, job_id, stage, worker) else {
            return Ok(false);
        };
        item.status = WorkStatus::Failed;
        item.last_error = Some(error.to_string());
        item.updated_at = Utc::now();
        Ok(true)
    }

    async fn reset(&self, job_id: Uuid, stage: Stage) -> Result<bool> {
        let mut tables = self.lock();
        match tables.work.get_mut(&(job_id, stage)) {
            Some(item) if item.status.is_terminal() => {
                item.status = WorkStatus::Pending;
                item.attempts = 0;
                item.worker_id = None;
                item.last_error = None;
                item.claimed_at = None;
                item.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, job_id: Uuid, stage: Stage) -> Result<bool> {
        Ok(self.lock().work.remove(&(job_id, stage)).is_some())
    }

    async fn reconcile_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<WorkItem>> {
        let mut tables = self.lock();
        let now = Utc::now();
        let mut stale = Vec::new();
        for item in tables.work.values_mut() {
            let expired = item.claimed_at.map(|at| at < cutoff).unwrap_or(false);
            if item.status == WorkStatus::InProgress && expired {
                item.status = WorkStatus::Failed;
                item.last_error = Some("liveness timeout exceeded".to_string());
                item.updated_at = now;
                stale.push(item.clone());
            }
        }
        Ok(stale)
    }

    async fn requeue_failed(&self, max_attempts: i32) -> Result<u64> {
        let mut tables = self.lock();
        let now = Utc::now();
        let mut requeued = 0;
        for item in tables.work.values_mut() {
            if item.status == WorkStatus::Failed && item.attempts < max_attempts {
                item.status = WorkStatus::Pending;
                item.worker_id = None;
                item.claimed_at = None;
                item.updated_at = now;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn items_for_job(&self, job_id: Uuid) -> Result<Vec<WorkItem>> {
        Ok(self
            .lock()
            .work
            .values()
            .filter(|item| item.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn list_by_status(&self, status: WorkStatus) -> Result<Vec<WorkItem>> {
        let mut items: Vec<WorkItem> = self
            .lock()
            .work
            .values()
            .filter(|item| item.status == status)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(items)
    }
}

#[async_trait]
impl GeneratedStore for MemoryStore {
    async fn insert_generated(&self, generated: &GeneratedArtifact) -> Result<()> {
        self.lock().generated.push(generated.clone());
        Ok(())
    }

    async fn list_generated(&self, job_id: Uuid) -> Result<Vec<GeneratedArtifact>> {
        Ok(self
            .lock()
            .generated
            .iter()
            .filter(|g| g.job_id == job_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(source_id: &str, description: &str) -> RawPosting {
        RawPosting {
            source_id: source_id.to_string(),
            source_url: None,
            title: "Data Engineer".to_string(),
            company: Some("Acme".to_string()),
            location: None,
            description: description.to_string(),
        }
    }

    async fn job_with_item(store: &MemoryStore, stage: Stage) -> Uuid {
        let id = store
            .upsert_posting(&posting("src:1", "ETL"), RefetchPolicy::default())
            .await
            .unwrap()
            .job_id();
        store.enqueue(id, stage).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_second_claim_conflicts() {
        let store = MemoryStore::new();
        let id = job_with_item(&store, Stage::Rank).await;

        assert!(matches!(
            store.claim(id, Stage::Rank, "w1").await.unwrap(),
            ClaimOutcome::Claimed(_)
        ));
        assert!(matches!(
            store.claim(id, Stage::Rank, "w2").await.unwrap(),
            ClaimOutcome::Conflict
        ));
        assert!(matches!(
            store.claim(id, Stage::Tailor, "w2").await.unwrap(),
            ClaimOutcome::Missing
        ));
    }

    #[tokio::test]
    async fn test_complete_requires_owner_and_enqueues_next() {
        let store = MemoryStore::new();
        let id = job_with_item(&store, Stage::Parse).await;
        store.claim(id, Stage::Parse, "w1").await.unwrap();

        assert!(!store.complete(id, Stage::Parse, "w2", Some(Stage::Rank)).await.unwrap());
        assert!(store.complete(id, Stage::Parse, "w1", Some(Stage::Rank)).await.unwrap());

        let items = store.items_for_job(id).await.unwrap();
        let rank = items.iter().find(|i| i.stage == Stage::Rank).unwrap();
        assert_eq!(rank.status, WorkStatus::Pending);
        assert!(matches!(
            store.claim(id, Stage::Parse, "w1").await.unwrap(),
            ClaimOutcome::NotPending(WorkStatus::Done)
        ));
    }

    #[tokio::test]
    async fn test_enqueue_leaves_in_progress_alone() {
        let store = MemoryStore::new();
        let id = job_with_item(&store, Stage::Rank).await;
        store.claim(id, Stage::Rank, "w1").await.unwrap();
        store.enqueue(id, Stage::Rank).await.unwrap();

        let item = &store.items_for_job(id).await.unwrap()[0];
        assert_eq!(item.status, WorkStatus::InProgress);
        assert_eq!(item.attempts, 1);
    }

    #[tokio::test]
    async fn test_reconcile_then_requeue_respects_max_attempts() {
        let store = MemoryStore::new();
        let id = job_with_item(&store, Stage::Rank).await;
        store.claim(id, Stage::Rank, "w1").await.unwrap();
        store.backdate_claims(Duration::minutes(30));

        let stale = store
            .reconcile_stale(Utc::now() - Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].status, WorkStatus::Failed);

        assert_eq!(store.requeue_failed(1).await.unwrap(), 0);
        assert_eq!(store.requeue_failed(3).await.unwrap(), 1);
        assert!(matches!(
            store.claim(id, Stage::Rank, "w2").await.unwrap(),
            ClaimOutcome::Claimed(_)
        ));
        // The first worker no longer owns it.
        assert!(!store.complete(id, Stage::Rank, "w1", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_next_takes_oldest_pending() {
        let store = MemoryStore::new();
        let first = job_with_item(&store, Stage::Parse).await;
        let second = store
            .upsert_posting(&posting("src:2", "Spark"), RefetchPolicy::default())
            .await
            .unwrap()
            .job_id();
        store.enqueue(second, Stage::Parse).await.unwrap();

        let claimed = store.claim_next(Stage::Parse, "w1").await.unwrap().unwrap();
        assert_eq!(claimed.job_id, first);
        let claimed = store.claim_next(Stage::Parse, "w1").await.unwrap().unwrap();
        assert_eq!(claimed.job_id, second);
        assert!(store.claim_next(Stage::Parse, "w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_embedding_discards_stale_revision() {
        let store = MemoryStore::new();
        let artifact = store
            .create_artifact(&NewArtifact {
                name: "bullet".to_string(),
                kind: crate::models::artifact::ArtifactKind::ResumeBullet,
                content: "Built ETL".to_string(),
                source: None,
            })
            .await
            .unwrap();
        store
            .update_artifact_content(artifact.id, "Built Spark jobs")
            .await
            .unwrap();

        assert!(!store.store_embedding(artifact.id, 1, &[1.0]).await.unwrap());
        assert!(store.store_embedding(artifact.id, 2, &[1.0]).await.unwrap());
    }

    #[tokio::test]
    async fn test_description_embedding_first_writer_wins() {
        let store = MemoryStore::new();
        let id = job_with_item(&store, Stage::Rank).await;
        assert_eq!(store.cache_description_embedding(id, &[1.0, 0.0]).await.unwrap(), vec![1.0, 0.0]);
        assert_eq!(store.cache_description_embedding(id, &[0.0, 1.0]).await.unwrap(), vec![1.0, 0.0]);
    }
}
