//! Document generation — job context + ranked evidence + profile in,
//! document text + reasoning trace out.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::errors::PipelineError;
use crate::llm_client::prompts::GROUNDING_INSTRUCTION;
use crate::llm_client::{LlmClient, LlmError};
use crate::models::generated::{DocumentKind, Variant};
use crate::models::job::Job;
use crate::profile::ValidatedProfile;
use crate::ranking::ArtifactMatch;
use crate::tailor::prompts::{
    generation_system, COVER_LETTER_INSTRUCTION, GENERATION_PROMPT_TEMPLATE, RESUME_INSTRUCTION,
};

const GENERATION_TEMPERATURE: f32 = 0.4;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Generator returned an empty document")]
    EmptyDocument,
}

impl From<GenerationError> for PipelineError {
    fn from(err: GenerationError) -> Self {
        PipelineError::GenerationUnavailable(err.to_string())
    }
}

/// Everything the generator sees for one document.
pub struct GenerationRequest<'a> {
    pub job: &'a Job,
    pub matches: &'a [ArtifactMatch],
    pub profile: &'a ValidatedProfile,
    pub variant: &'a Variant,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratedDocument {
    pub document: String,
    #[serde(default)]
    pub reasoning: String,
}

#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<GeneratedDocument, GenerationError>;
}

pub struct ClaudeDocumentGenerator {
    llm: LlmClient,
}

impl ClaudeDocumentGenerator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl DocumentGenerator for ClaudeDocumentGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<GeneratedDocument, GenerationError> {
        let prompt = build_prompt(request);
        let generated: GeneratedDocument = self
            .llm
            .call_json(&prompt, &generation_system(), GENERATION_TEMPERATURE)
            .await?;
        if generated.document.trim().is_empty() {
            return Err(GenerationError::EmptyDocument);
        }
        info!(
            "Generated {} for job {} ({} chars, {} evidence snippets)",
            request.variant.kind,
            request.job.id,
            generated.document.len(),
            request.matches.len()
        );
        Ok(generated)
    }
}

pub fn build_prompt(request: &GenerationRequest<'_>) -> String {
    let job = request.job;
    let kind_instruction = match request.variant.kind {
        DocumentKind::Resume => RESUME_INSTRUCTION,
        DocumentKind::CoverLetter => COVER_LETTER_INSTRUCTION,
    };
    let skills = job
        .skills()
        .map(|s| s.join(", "))
        .unwrap_or_else(|| "not extracted".to_string());

    GENERATION_PROMPT_TEMPLATE
        .replace("{grounding_instruction}", GROUNDING_INSTRUCTION)
        .replace("{kind_instruction}", kind_instruction)
        .replace("{persona}", &request.variant.persona)
        .replace("{profile}", &request.profile.render())
        .replace("{evidence}", &render_evidence(request.matches))
        .replace("{job_title}", &job.title)
        .replace("{company}", job.company.as_deref().unwrap_or("unknown"))
        .replace("{location}", job.location.as_deref().unwrap_or("unspecified"))
        .replace("{skills}", &skills)
        .replace("{description}", &job.description)
}

fn render_evidence(matches: &[ArtifactMatch]) -> String {
    if matches.is_empty() {
        return "(no evidence available)".to_string();
    }
    matches
        .iter()
        .enumerate()
        .map(|(i, m)| {
            format!(
                "[{}] {} ({}, score {:.2})\n{}",
                i + 1,
                m.name,
                m.kind,
                m.combined_score,
                m.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
