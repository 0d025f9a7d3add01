//! Job sources. Fetch is not a per-job queue stage: it creates jobs and
//! enqueues their Parse step.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::errors::PipelineError;
use crate::models::job::RawPosting;

pub mod adzuna;

pub use adzuna::AdzunaSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Source API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("No job source is configured")]
    NotConfigured,
}

impl From<SourceError> for PipelineError {
    fn from(err: SourceError) -> Self {
        PipelineError::SourceUnavailable(err.to_string())
    }
}

#[async_trait]
pub trait JobSource: Send + Sync {
    /// Short name used in logs and as the `source_id` prefix.
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<RawPosting>, SourceError>;
}

/// Summary of one fetch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Jobs whose Parse stage was (re-)enqueued.
    pub enqueued: usize,
}
