// Prompt constants for document generation.
// Reuses the grounding fragment from llm_client::prompts.

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;

pub fn generation_system() -> String {
    format!(
        "You are an expert career writer producing application documents tailored \
         to one job posting, using only verified evidence about the candidate. {}",
        JSON_ONLY_SYSTEM
    )
}

/// Replace: {grounding_instruction}, {kind_instruction}, {persona}, {profile},
///          {evidence}, {job_title}, {company}, {location}, {skills}, {description}
pub const GENERATION_PROMPT_TEMPLATE: &str = r#"{grounding_instruction}

DOCUMENT: {kind_instruction}
PERSONA VARIANT: {persona}

CANDIDATE PROFILE:
{profile}

EVIDENCE SNIPPETS (ranked by relevance to the job, most relevant first):
{evidence}

TARGET JOB:
Title: {job_title}
Company: {company}
Location: {location}
Key skills: {skills}

Description:
{description}

Return a JSON object with this EXACT schema:
{
  "document": "the full document text in Markdown",
  "reasoning": "which evidence snippets you used for which claims, and why"
}"#;

pub const RESUME_INSTRUCTION: &str = "A one-page resume in Markdown. Lead with the \
    experience most relevant to the target job. Use concise, quantified bullets \
    drawn from the evidence snippets.";

pub const COVER_LETTER_INSTRUCTION: &str = "A cover letter of three to four short \
    paragraphs in Markdown, addressed to the hiring team. Connect two or three \
    evidence snippets directly to the job's stated needs. No generic filler.";
