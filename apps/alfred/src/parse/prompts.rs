// Prompt constants for LLM-backed skill extraction.

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;

/// System prompt for skill extraction. Appends the shared JSON-only fragment.
pub fn skill_extraction_system() -> String {
    format!(
        "You are a technical recruiter who catalogues the skills a job posting asks for. {}",
        JSON_ONLY_SYSTEM
    )
}

/// Skill extraction prompt template. Replace `{jd_text}` before sending.
pub const SKILL_EXTRACTION_PROMPT_TEMPLATE: &str = r#"Extract the technical skills, tools and certifications named in the job posting below.

Return a JSON object with this EXACT schema (no extra fields):
{
  "languages": ["python", "sql"],
  "cloud": ["aws"],
  "data_eng": ["airflow", "spark"],
  "ml_ai": [],
  "databases": ["postgres"],
  "frontend": [],
  "tools": ["docker"],
  "analytics": [],
  "security": [],
  "certs": [],
  "seniority": "senior"
}

Rules:
- Only list skills that appear in the posting. Do NOT infer skills from the company or industry.
- Use short lowercase canonical names ("postgres", not "PostgreSQL database").
- Every category key must be present; use [] when nothing applies.
- "seniority" is one of "intern", "junior", "mid", "senior", "lead", "staff", "principal", or null.

Job posting:
{jd_text}"#;
