//! Parse — turns a raw job description into `ParsedPosting`.
//!
//! Default: `KeywordExtractor` (dictionary-based, deterministic, no remote call).
//! Optional: `LlmExtractor` (skills via Claude, requirements via the keyword rules).
//!
//! `Pipeline` holds an `Arc<dyn TextExtractor>`, chosen at startup via `EXTRACTOR`.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::PipelineError;
use crate::models::job::ParsedPosting;

pub mod llm;
pub mod prompts;
pub mod skills;

pub use llm::LlmExtractor;
pub use skills::KeywordExtractor;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("description is empty")]
    EmptyText,

    #[error("extractor backend failed: {0}")]
    Backend(String),
}

impl From<ExtractionError> for PipelineError {
    fn from(err: ExtractionError) -> Self {
        PipelineError::ExtractionFailure(err.to_string())
    }
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<ParsedPosting, ExtractionError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractorBackend {
    #[default]
    Keyword,
    Llm,
}

impl fmt::Display for ExtractorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractorBackend::Keyword => f.write_str("keyword"),
            ExtractorBackend::Llm => f.write_str("llm"),
        }
    }
}

impl FromStr for ExtractorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyword" => Ok(ExtractorBackend::Keyword),
            "llm" => Ok(ExtractorBackend::Llm),
            other => Err(format!("unknown extractor backend '{other}'")),
        }
    }
}

/// Collapses control characters and runs of whitespace before text reaches
/// an extractor or the embedding client.
pub fn clean_text(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
