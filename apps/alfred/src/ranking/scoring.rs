use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Blend between embedding similarity and lexical skill overlap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub similarity: f64,
    pub skill_overlap: f64,
}

impl Default for ScoringWeights {
    /// Pure cosine.
    fn default() -> Self {
        Self {
            similarity: 1.0,
            skill_overlap: 0.0,
        }
    }
}

/// Fraction of the job's skills the artifact covers: |job ∩ artifact| / |job|.
/// Returns 0.0 for an empty job skill list.
pub fn skill_overlap(job_skills: &[String], artifact_skills: &[String]) -> f64 {
    let job: HashSet<&str> = job_skills.iter().map(String::as_str).collect();
    if job.is_empty() {
        return 0.0;
    }
    let artifact: HashSet<&str> = artifact_skills.iter().map(String::as_str).collect();
    job.intersection(&artifact).count() as f64 / job.len() as f64
}

/// Without an overlap value the combined score is the similarity itself.
/// With one, `min(1, w_sim * sim + w_skill * overlap)`.
pub fn compute_combined_score(
    similarity: f64,
    skill_overlap: Option<f64>,
    weights: &ScoringWeights,
) -> f64 {
    match skill_overlap {
        None => similarity,
        Some(overlap) => {
            (weights.similarity * similarity + weights.skill_overlap * overlap).min(1.0)
        }
    }
}
