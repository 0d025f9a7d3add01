//! LLM-backed extraction. Skills and seniority come from Claude; requirement
//! lines still come from the keyword rules so both backends agree on them.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::prompts::{skill_extraction_system, SKILL_EXTRACTION_PROMPT_TEMPLATE};
use super::skills::extract_requirements;
use super::{clean_text, ExtractionError, TextExtractor};
use crate::llm_client::LlmClient;
use crate::models::job::{ParsedPosting, SkillSet};

#[derive(Debug, Default, Deserialize)]
struct LlmSkills {
    #[serde(default)]
    languages: Vec<String>,
    #[serde(default)]
    cloud: Vec<String>,
    #[serde(default)]
    data_eng: Vec<String>,
    #[serde(default)]
    ml_ai: Vec<String>,
    #[serde(default)]
    databases: Vec<String>,
    #[serde(default)]
    frontend: Vec<String>,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    analytics: Vec<String>,
    #[serde(default)]
    security: Vec<String>,
    #[serde(default)]
    certs: Vec<String>,
    #[serde(default)]
    seniority: Option<String>,
}

impl LlmSkills {
    fn into_posting(self, description: &str) -> ParsedPosting {
        let skills = SkillSet::from_categories(vec![
            ("languages".to_string(), self.languages),
            ("cloud".to_string(), self.cloud),
            ("data_eng".to_string(), self.data_eng),
            ("ml_ai".to_string(), self.ml_ai),
            ("databases".to_string(), self.databases),
            ("frontend".to_string(), self.frontend),
            ("tools".to_string(), self.tools),
            ("analytics".to_string(), self.analytics),
            ("security".to_string(), self.security),
            ("certs".to_string(), self.certs),
        ]);
        let seniority = self
            .seniority
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        ParsedPosting {
            skills,
            requirements: extract_requirements(description),
            seniority,
        }
    }
}

pub struct LlmExtractor {
    llm: LlmClient,
}

impl LlmExtractor {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl TextExtractor for LlmExtractor {
    async fn extract(&self, text: &str) -> Result<ParsedPosting, ExtractionError> {
        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            return Err(ExtractionError::EmptyText);
        }
        let prompt = SKILL_EXTRACTION_PROMPT_TEMPLATE.replace("{jd_text}", &cleaned);
        let raw: LlmSkills = self
            .llm
            .call_json(&prompt, &skill_extraction_system(), 0.0)
            .await
            .map_err(|e| ExtractionError::Backend(format!("skill extraction failed: {e}")))?;
        debug!("LLM extraction returned seniority={:?}", raw.seniority);
        Ok(raw.into_posting(text))
    }
}
