//! Pipeline — stage semantics for fetch → parse → rank → tailor.
//!
//! `Pipeline` owns no schedule. Workers (`worker.rs`) and HTTP routes both
//! call into it; every coordination point goes through the stores, so any
//! number of callers can run concurrently against the same database.
//!
//! Queue-driven stages follow one shape:
//!
//! ```text
//! claim (pending → in_progress)
//!   → execute_stage
//!   → complete (done + enqueue next)   or   fail (failed + last_error)
//! ```
//!
//! A provider error leaves every earlier stage's output untouched; the item
//! is marked failed and the reconciliation sweep requeues it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::embeddings::Embedder;
use crate::errors::PipelineError;
use crate::fetch::{FetchReport, JobSource, SourceError};
use crate::models::generated::{DocumentKind, GeneratedArtifact, Variant};
use crate::models::job::{Job, ParsedPosting, RawPosting, RefetchPolicy};
use crate::models::queue::{ClaimOutcome, Stage, WorkItem, WorkStatus};
use crate::parse::{clean_text, TextExtractor};
use crate::profile::ValidatedProfile;
use crate::ranking::engine::{match_score, rank_candidates, Candidate};
use crate::ranking::{ensure_embedded, ArtifactMatch, MatchReport, RankSettings};
use crate::store::{ArtifactStore, GeneratedStore, JobStore, UpsertOutcome, WorkQueue};
use crate::tailor::{archive_key, DocumentArchive, DocumentGenerator, GenerationRequest};

pub mod worker;

pub const DEFAULT_TAILOR_MIN_SCORE: f64 = 0.46;
pub const DEFAULT_PERSONA: &str = "default";

// ────────────────────────────────────────────────────────────────────────────
// Wiring
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub rank: RankSettings,
    /// Rank enqueues Tailor only at or above this score.
    pub tailor_min_score: f64,
    /// Documents the queue-driven Tailor stage produces, one each.
    pub tailor_kinds: Vec<DocumentKind>,
    pub default_persona: String,
    pub refetch_policy: RefetchPolicy,
    pub liveness_timeout: Duration,
    pub max_attempts: i32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            rank: RankSettings::default(),
            tailor_min_score: DEFAULT_TAILOR_MIN_SCORE,
            tailor_kinds: vec![DocumentKind::Resume, DocumentKind::CoverLetter],
            default_persona: DEFAULT_PERSONA.to_string(),
            refetch_policy: RefetchPolicy::default(),
            liveness_timeout: Duration::from_secs(900),
            max_attempts: 3,
        }
    }
}

/// The four store seams. In production all four point at one `PgStore`.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub generated: Arc<dyn GeneratedStore>,
}

impl Stores {
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: JobStore + ArtifactStore + WorkQueue + GeneratedStore + 'static,
    {
        Self {
            jobs: store.clone(),
            artifacts: store.clone(),
            queue: store.clone(),
            generated: store,
        }
    }
}

/// Remote collaborators. `source` and `archive` are optional features.
#[derive(Clone)]
pub struct Providers {
    pub embedder: Arc<dyn Embedder>,
    pub extractor: Arc<dyn TextExtractor>,
    pub generator: Arc<dyn DocumentGenerator>,
    pub source: Option<Arc<dyn JobSource>>,
    pub archive: Option<Arc<dyn DocumentArchive>>,
}

#[derive(Clone)]
pub struct Pipeline {
    stores: Stores,
    providers: Providers,
    profile: Arc<ValidatedProfile>,
    settings: Arc<PipelineSettings>,
}

// ────────────────────────────────────────────────────────────────────────────
// Reports
// ────────────────────────────────────────────────────────────────────────────

/// What happened to one claimed work item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    Done { job_id: Uuid, next: Option<Stage> },
    Failed { job_id: Uuid, error: String },
    /// The claim was taken over (reconciled and reclaimed) before completion.
    Lost { job_id: Uuid },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageRunReport {
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub lost: usize,
}

impl StageRunReport {
    fn record(&mut self, outcome: &StageOutcome) {
        self.claimed += 1;
        match outcome {
            StageOutcome::Done { .. } => self.succeeded += 1,
            StageOutcome::Failed { .. } => self.failed += 1,
            StageOutcome::Lost { .. } => self.lost += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub stale: usize,
    pub requeued: u64,
}

/// A job with its per-stage queue state.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub stages: Vec<WorkItem>,
    /// True when any stage is failed and waiting for a retry.
    pub needs_retry: bool,
}

fn require_parsed(job: &Job) -> Result<(), PipelineError> {
    match job.parsed {
        Some(_) => Ok(()),
        None => Err(PipelineError::NotParsed(job.id)),
    }
}

fn worker_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

impl Pipeline {
    pub fn new(
        stores: Stores,
        providers: Providers,
        profile: ValidatedProfile,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            stores,
            providers,
            profile: Arc::new(profile),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn jobs(&self) -> &dyn JobStore {
        self.stores.jobs.as_ref()
    }

    pub fn artifacts(&self) -> &dyn ArtifactStore {
        self.stores.artifacts.as_ref()
    }

    pub fn queue(&self) -> &dyn WorkQueue {
        self.stores.queue.as_ref()
    }

    pub fn generated(&self) -> &dyn GeneratedStore {
        self.stores.generated.as_ref()
    }

    pub fn has_source(&self) -> bool {
        self.providers.source.is_some()
    }

    async fn load_job(&self, job_id: Uuid) -> Result<Job, PipelineError> {
        self.stores
            .jobs
            .get_job(job_id)
            .await?
            .ok_or(PipelineError::JobNotFound(job_id))
    }

    // ────────────────────────────────────────────────────────────────────────
    // Fetch
    // ────────────────────────────────────────────────────────────────────────

    /// Pulls postings from the job source and upserts them by `source_id`.
    /// New jobs, and changed jobs whose derived fields were cleared, get a
    /// pending Parse item.
    pub async fn run_fetch(&self) -> Result<FetchReport, PipelineError> {
        let source = self
            .providers
            .source
            .as_ref()
            .ok_or(SourceError::NotConfigured)?;
        let postings = source.fetch().await?;

        let mut report = FetchReport {
            fetched: postings.len(),
            ..FetchReport::default()
        };
        for posting in &postings {
            let (outcome, reparse) = self.ingest(posting).await?;
            match outcome {
                UpsertOutcome::Inserted(_) => report.inserted += 1,
                UpsertOutcome::Updated { .. } => report.updated += 1,
                UpsertOutcome::Unchanged(_) => report.unchanged += 1,
            }
            if reparse {
                report.enqueued += 1;
            }
        }

        info!(
            "Fetch from {}: {} fetched, {} new, {} updated, {} unchanged",
            source.name(),
            report.fetched,
            report.inserted,
            report.updated,
            report.unchanged
        );
        Ok(report)
    }

    /// Adds a hand-submitted posting through the same upsert as fetched ones.
    pub async fn submit_posting(&self, posting: &RawPosting) -> Result<UpsertOutcome, PipelineError> {
        let (outcome, reparse) = self.ingest(posting).await?;
        info!(
            "Manual posting {} stored as job {} (parse enqueued: {})",
            posting.source_id,
            outcome.job_id(),
            reparse
        );
        Ok(outcome)
    }

    /// Upserts one posting and enqueues Parse when it is new or its derived
    /// fields were cleared. The flag reports whether Parse was enqueued.
    async fn ingest(&self, posting: &RawPosting) -> Result<(UpsertOutcome, bool), PipelineError> {
        let outcome = self
            .stores
            .jobs
            .upsert_posting(posting, self.settings.refetch_policy)
            .await?;
        let reparse = match outcome {
            UpsertOutcome::Inserted(_) => true,
            UpsertOutcome::Updated { derived_cleared, .. } => derived_cleared,
            UpsertOutcome::Unchanged(_) => false,
        };
        if reparse {
            self.stores.queue.enqueue(outcome.job_id(), Stage::Parse).await?;
        }
        Ok((outcome, reparse))
    }

    // ────────────────────────────────────────────────────────────────────────
    // Parse
    // ────────────────────────────────────────────────────────────────────────

    /// Drains the pending Parse items once.
    pub async fn run_parse(&self) -> Result<StageRunReport, PipelineError> {
        self.drain(Stage::Parse).await
    }

    /// Extracts structured fields from the job's text. On failure nothing is
    /// written; the raw description stays as fetched.
    pub async fn parse_job(&self, job_id: Uuid) -> Result<ParsedPosting, PipelineError> {
        let job = self.load_job(job_id).await?;
        if job.description.trim().is_empty() {
            return Err(PipelineError::ExtractionFailure(
                "job description is empty".to_string(),
            ));
        }
        let parsed = self.providers.extractor.extract(&job.embedding_text()).await?;
        self.stores.jobs.set_parsed(job_id, &parsed).await?;
        debug!(
            "Parsed job {}: {} skills, {} requirements",
            job_id,
            parsed.skills.all.len(),
            parsed.requirements.len()
        );
        Ok(parsed)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Rank / match
    // ────────────────────────────────────────────────────────────────────────

    /// Ranks the corpus against the job and persists the top-1 score.
    ///
    /// The description embedding is cached with a first-writer-wins write and
    /// the stored value is used from then on, so repeated runs agree.
    pub async fn rank_and_match(&self, job_id: Uuid) -> Result<MatchReport, PipelineError> {
        let job = self.load_job(job_id).await?;
        self.rank_job(job).await
    }

    /// `rank_and_match` for a job whose Parse output is already stored.
    async fn rank_parsed(&self, job_id: Uuid) -> Result<MatchReport, PipelineError> {
        let job = self.load_job(job_id).await?;
        require_parsed(&job)?;
        self.rank_job(job).await
    }

    async fn rank_job(&self, job: Job) -> Result<MatchReport, PipelineError> {
        let job_id = job.id;
        let job_embedding = match &job.description_embedding {
            Some(cached) => cached.clone(),
            None => {
                let text = clean_text(&job.embedding_text());
                let computed = self.providers.embedder.embed(&text).await?;
                self.stores
                    .jobs
                    .cache_description_embedding(job_id, &computed)
                    .await?
            }
        };

        let matches = self.compute_matches(&job, &job_embedding).await?;
        let score = match_score(&matches);
        self.stores.jobs.set_match_score(job_id, score).await?;

        info!(
            "Ranked job {} against corpus: {} matches, score {:.3}",
            job_id,
            matches.len(),
            score
        );
        Ok(MatchReport {
            job_id,
            matches,
            match_score: score,
        })
    }

    /// Ranked top-K list for an already-embedded job. Caches missing artifact
    /// embeddings but never writes to the job.
    async fn compute_matches(
        &self,
        job: &Job,
        job_embedding: &[f32],
    ) -> Result<Vec<ArtifactMatch>, PipelineError> {
        self.rank_corpus(job_embedding, job.skills(), self.settings.rank.top_k)
            .await
    }

    /// Ranks a posting that is not stored. Only missing artifact embeddings
    /// are written.
    pub async fn match_posting(
        &self,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<ArtifactMatch>, PipelineError> {
        let text = clean_text(text);
        if text.is_empty() {
            return Err(PipelineError::ExtractionFailure(
                "posting text is empty".to_string(),
            ));
        }
        let parsed = self.providers.extractor.extract(&text).await?;
        let embedding = self.providers.embedder.embed(&text).await?;
        let skills = Some(parsed.skills.all.as_slice()).filter(|s| !s.is_empty());
        self.rank_corpus(&embedding, skills, top_k).await
    }

    /// Free-text similarity search over the corpus. No skill blending.
    pub async fn search_artifacts(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ArtifactMatch>, PipelineError> {
        let embedding = self.providers.embedder.embed(&clean_text(query)).await?;
        self.rank_corpus(&embedding, None, top_k).await
    }

    async fn rank_corpus(
        &self,
        query_embedding: &[f32],
        skills: Option<&[String]>,
        top_k: usize,
    ) -> Result<Vec<ArtifactMatch>, PipelineError> {
        let artifacts = self.stores.artifacts.list_artifacts().await?;
        let mut embeddings = Vec::with_capacity(artifacts.len());
        for artifact in &artifacts {
            let embedding = ensure_embedded(
                self.stores.artifacts.as_ref(),
                self.providers.embedder.as_ref(),
                artifact,
            )
            .await?;
            embeddings.push(embedding);
        }

        let candidates: Vec<Candidate<'_>> = artifacts
            .iter()
            .zip(&embeddings)
            .map(|(artifact, embedding)| Candidate {
                artifact,
                embedding,
            })
            .collect();
        let settings = RankSettings {
            top_k,
            ..self.settings.rank.clone()
        };
        Ok(rank_candidates(query_embedding, skills, &candidates, &settings))
    }

    // ────────────────────────────────────────────────────────────────────────
    // Tailor
    // ────────────────────────────────────────────────────────────────────────

    /// Generates one document for the job and appends it. Regenerating the
    /// same variant appends another record.
    pub async fn tailor(&self, job_id: Uuid, variant: &Variant) -> Result<Uuid, PipelineError> {
        let job = self.load_job(job_id).await?;
        let job_embedding = match (&job.match_score, &job.description_embedding) {
            (Some(_), Some(embedding)) => embedding.clone(),
            _ => return Err(PipelineError::NotScored(job_id)),
        };

        let matches = self.compute_matches(&job, &job_embedding).await?;
        let document = self
            .providers
            .generator
            .generate(&GenerationRequest {
                job: &job,
                matches: &matches,
                profile: &self.profile,
                variant,
            })
            .await?;

        let mut record = GeneratedArtifact {
            id: Uuid::new_v4(),
            job_id,
            persona: variant.persona.clone(),
            kind: variant.kind,
            content: document.document,
            reasoning: document.reasoning,
            source_artifact_ids: matches.iter().map(|m| m.artifact_id).collect(),
            archive_key: None,
            created_at: Utc::now(),
        };

        if let Some(archive) = &self.providers.archive {
            let key = archive_key(&record);
            match archive.put(&key, &record.content).await {
                Ok(()) => record.archive_key = Some(key),
                Err(e) => warn!("Archiving {} for job {} failed: {e:#}", record.kind, job_id),
            }
        }

        self.stores.generated.insert_generated(&record).await?;
        info!(
            "Stored {} {} for job {} (persona {})",
            record.kind, record.id, job_id, record.persona
        );
        Ok(record.id)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Queue-driven execution
    // ────────────────────────────────────────────────────────────────────────

    /// Claims the oldest pending item of `stage` and runs it to completion.
    /// Returns `None` when nothing is pending.
    pub async fn work_next(
        &self,
        stage: Stage,
        worker: &str,
    ) -> Result<Option<StageOutcome>, PipelineError> {
        let Some(item) = self.stores.queue.claim_next(stage, worker).await? else {
            return Ok(None);
        };
        debug!(
            "{} claimed {} for job {} (attempt {})",
            worker, stage, item.job_id, item.attempts
        );
        let result = self.execute_stage(item.job_id, stage).await;
        if let Err(e) = &result {
            if item.attempts >= self.settings.max_attempts {
                warn!("{stage} for job {} exhausted its attempts; needs an explicit reset", item.job_id);
            } else if e.is_transient() {
                debug!("{stage} for job {} hit a provider error; the sweep will retry it", item.job_id);
            }
        }
        self.settle(item.job_id, stage, worker, result.map_err(|e| e.to_string()))
            .await
            .map(Some)
    }

    /// Runs the stage body. Returns the stage to enqueue next.
    async fn execute_stage(&self, job_id: Uuid, stage: Stage) -> Result<Option<Stage>, PipelineError> {
        match stage {
            Stage::Parse => {
                self.parse_job(job_id).await?;
                Ok(Some(Stage::Rank))
            }
            Stage::Rank => {
                let report = self.rank_parsed(job_id).await?;
                Ok(self.next_after_rank(&report))
            }
            Stage::Tailor => {
                for kind in self.missing_kinds(job_id).await? {
                    let variant = Variant {
                        persona: self.settings.default_persona.clone(),
                        kind,
                    };
                    self.tailor(job_id, &variant).await?;
                }
                Ok(None)
            }
        }
    }

    /// Configured kinds with no document for the default persona since the
    /// job was last scored. A retried Tailor item resumes where it failed.
    async fn missing_kinds(&self, job_id: Uuid) -> Result<Vec<DocumentKind>, PipelineError> {
        let job = self.load_job(job_id).await?;
        let existing = self.stores.generated.list_generated(job_id).await?;
        let persona = &self.settings.default_persona;
        Ok(self
            .settings
            .tailor_kinds
            .iter()
            .copied()
            .filter(|kind| {
                !existing.iter().any(|g| {
                    g.persona == *persona && g.kind == *kind && g.created_at >= job.updated_at
                })
            })
            .collect())
    }

    fn next_after_rank(&self, report: &MatchReport) -> Option<Stage> {
        if report.match_score >= self.settings.tailor_min_score {
            Some(Stage::Tailor)
        } else {
            debug!(
                "Job {} scored {:.3}, below tailor threshold {:.3}",
                report.job_id, report.match_score, self.settings.tailor_min_score
            );
            None
        }
    }

    /// Records a stage result in the queue.
    async fn settle(
        &self,
        job_id: Uuid,
        stage: Stage,
        worker: &str,
        result: Result<Option<Stage>, String>,
    ) -> Result<StageOutcome, PipelineError> {
        match result {
            Ok(next) => {
                if self.stores.queue.complete(job_id, stage, worker, next).await? {
                    Ok(StageOutcome::Done { job_id, next })
                } else {
                    warn!("{worker} lost its claim on {stage} for job {job_id} before completing");
                    Ok(StageOutcome::Lost { job_id })
                }
            }
            Err(error) => {
                warn!("{stage} failed for job {job_id}: {error}");
                if self.stores.queue.fail(job_id, stage, worker, &error).await? {
                    Ok(StageOutcome::Failed { job_id, error })
                } else {
                    Ok(StageOutcome::Lost { job_id })
                }
            }
        }
    }

    async fn drain(&self, stage: Stage) -> Result<StageRunReport, PipelineError> {
        let worker = worker_id(&format!("drain-{stage}"));
        let mut report = StageRunReport::default();
        while let Some(outcome) = self.work_next(stage, &worker).await? {
            report.record(&outcome);
        }
        info!(
            "Drained {}: {} claimed, {} done, {} failed",
            stage, report.claimed, report.succeeded, report.failed
        );
        Ok(report)
    }

    // ────────────────────────────────────────────────────────────────────────
    // On-demand execution (HTTP triggers)
    // ────────────────────────────────────────────────────────────────────────

    /// Enqueues and claims `stage` for an on-demand run. A concurrent owner
    /// turns into `DuplicateClaim` and nothing is executed.
    async fn claim_on_demand(&self, job_id: Uuid, stage: Stage) -> Result<String, PipelineError> {
        let worker = worker_id("http");
        self.stores.queue.enqueue(job_id, stage).await?;
        match self.stores.queue.claim(job_id, stage, &worker).await? {
            ClaimOutcome::Claimed(_) => Ok(worker),
            ClaimOutcome::Conflict | ClaimOutcome::NotPending(_) | ClaimOutcome::Missing => {
                Err(PipelineError::DuplicateClaim { job_id, stage })
            }
        }
    }

    /// `rank_and_match` under a claim on the Rank item.
    pub async fn rank_on_demand(&self, job_id: Uuid) -> Result<MatchReport, PipelineError> {
        require_parsed(&self.load_job(job_id).await?)?;
        let worker = self.claim_on_demand(job_id, Stage::Rank).await?;
        match self.rank_and_match(job_id).await {
            Ok(report) => {
                let next = self.next_after_rank(&report);
                self.settle(job_id, Stage::Rank, &worker, Ok(next)).await?;
                Ok(report)
            }
            Err(e) => {
                self.settle(job_id, Stage::Rank, &worker, Err(e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    /// `tailor` under a claim on the Tailor item.
    pub async fn tailor_on_demand(
        &self,
        job_id: Uuid,
        variant: &Variant,
    ) -> Result<Uuid, PipelineError> {
        let job = self.load_job(job_id).await?;
        if job.match_score.is_none() || job.description_embedding.is_none() {
            return Err(PipelineError::NotScored(job_id));
        }
        let worker = self.claim_on_demand(job_id, Stage::Tailor).await?;
        match self.tailor(job_id, variant).await {
            Ok(id) => {
                self.settle(job_id, Stage::Tailor, &worker, Ok(None)).await?;
                Ok(id)
            }
            Err(e) => {
                self.settle(job_id, Stage::Tailor, &worker, Err(e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Maintenance
    // ────────────────────────────────────────────────────────────────────────

    /// In-progress items older than the liveness timeout become failed, then
    /// failed items under the attempt limit go back to pending.
    pub async fn reconcile(&self) -> Result<ReconcileReport, PipelineError> {
        let timeout = chrono::Duration::from_std(self.settings.liveness_timeout)
            .map_err(|e| PipelineError::Store(anyhow::anyhow!("invalid liveness timeout: {e}")))?;
        let stale = self.stores.queue.reconcile_stale(Utc::now() - timeout).await?;
        for item in &stale {
            warn!(
                "Reclaimed stale {} for job {} (worker {:?})",
                item.stage, item.job_id, item.worker_id
            );
        }
        let requeued = self
            .stores
            .queue
            .requeue_failed(self.settings.max_attempts)
            .await?;
        if !stale.is_empty() || requeued > 0 {
            info!("Reconcile: {} stale, {} requeued", stale.len(), requeued);
        }
        Ok(ReconcileReport {
            stale: stale.len(),
            requeued,
        })
    }

    /// Enqueues Rank for every parsed job without a match score. Jobs still
    /// waiting on Parse get Rank from their Parse completion instead.
    pub async fn backfill_unscored(&self) -> Result<usize, PipelineError> {
        let ids = self.stores.jobs.unscored_job_ids().await?;
        for id in &ids {
            self.stores.queue.enqueue(*id, Stage::Rank).await?;
        }
        info!("Backfill enqueued Rank for {} unscored jobs", ids.len());
        Ok(ids.len())
    }

    pub async fn job_view(&self, job_id: Uuid) -> Result<JobView, PipelineError> {
        let job = self.load_job(job_id).await?;
        let stages = self.stores.queue.items_for_job(job_id).await?;
        let needs_retry = stages.iter().any(|i| i.status == WorkStatus::Failed);
        Ok(JobView {
            job,
            stages,
            needs_retry,
        })
    }
}
