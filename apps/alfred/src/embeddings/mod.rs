//! Embedding client — text in, fixed-length vector out.
//!
//! Every remote embedding call in Alfred goes through an `Embedder`. Callers
//! treat any `EmbeddingError` as retryable (`PipelineError::EmbeddingUnavailable`).

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::PipelineError;

pub mod openai;

pub use openai::OpenAiEmbedder;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Provider returned no embedding")]
    Empty,

    #[error("Expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Gave up after {retries} retries")]
    RetriesExhausted { retries: u32 },
}

impl From<EmbeddingError> for PipelineError {
    fn from(err: EmbeddingError) -> Self {
        PipelineError::EmbeddingUnavailable(err.to_string())
    }
}

/// Deterministic per model version: the same text yields the same vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns.
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}
