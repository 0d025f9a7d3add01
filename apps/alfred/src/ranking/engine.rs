//! Ranking — orders the artifact corpus against one job.
//!
//! No I/O here. The pipeline resolves embeddings first and hands over plain
//! vectors, so the ordering rules can be tested without a store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::artifact::{Artifact, ArtifactKind};
use crate::parse::skills::extract_skills;
use crate::ranking::scoring::{compute_combined_score, skill_overlap, ScoringWeights};
use crate::ranking::similarity::cosine_similarity;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_SNIPPET_CHARS: usize = 400;

#[derive(Debug, Clone, PartialEq)]
pub struct RankSettings {
    pub top_k: usize,
    pub weights: ScoringWeights,
    pub snippet_chars: usize,
}

impl Default for RankSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            weights: ScoringWeights::default(),
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMatch {
    pub artifact_id: Uuid,
    pub name: String,
    pub kind: ArtifactKind,
    pub similarity: f64,
    pub skill_overlap: Option<f64>,
    pub combined_score: f64,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReport {
    pub job_id: Uuid,
    pub matches: Vec<ArtifactMatch>,
    pub match_score: f64,
}

/// An artifact paired with the embedding to rank it by.
pub struct Candidate<'a> {
    pub artifact: &'a Artifact,
    pub embedding: &'a [f32],
}

/// Scores every candidate, sorts by combined score descending (ties by
/// artifact id ascending) and keeps the top K.
///
/// Skill overlap is only computed when the job has parsed skills.
pub fn rank_candidates(
    job_embedding: &[f32],
    job_skills: Option<&[String]>,
    candidates: &[Candidate<'_>],
    settings: &RankSettings,
) -> Vec<ArtifactMatch> {
    let mut matches: Vec<ArtifactMatch> = candidates
        .iter()
        .map(|candidate| {
            let similarity = cosine_similarity(job_embedding, candidate.embedding);
            let overlap = job_skills.map(|job| {
                let artifact_skills = extract_skills(&candidate.artifact.content);
                skill_overlap(job, &artifact_skills.all)
            });
            ArtifactMatch {
                artifact_id: candidate.artifact.id,
                name: candidate.artifact.name.clone(),
                kind: candidate.artifact.kind,
                similarity,
                skill_overlap: overlap,
                combined_score: compute_combined_score(similarity, overlap, &settings.weights),
                snippet: snippet(&candidate.artifact.content, settings.snippet_chars),
            }
        })
        .collect();

    matches.sort_by(|a, b| {
        b.combined_score
            .total_cmp(&a.combined_score)
            .then_with(|| a.artifact_id.cmp(&b.artifact_id))
    });
    matches.truncate(settings.top_k);
    matches
}

/// Top-1 combined score, or 0.0 for an empty match list.
pub fn match_score(matches: &[ArtifactMatch]) -> f64 {
    matches.first().map(|m| m.combined_score).unwrap_or(0.0)
}

/// First `max_chars` characters, with `...` appended when the text was cut.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
