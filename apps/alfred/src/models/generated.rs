use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Resume,
    CoverLetter,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Resume => "resume",
            DocumentKind::CoverLetter => "cover_letter",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "resume" => Ok(DocumentKind::Resume),
            "cover_letter" | "cover-letter" => Ok(DocumentKind::CoverLetter),
            other => Err(format!("unknown document kind '{other}'")),
        }
    }
}

/// Which document to produce for a job, and in whose voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub persona: String,
    pub kind: DocumentKind,
}

/// A generated application document. Append-only: never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub id: Uuid,
    pub job_id: Uuid,
    pub persona: String,
    pub kind: DocumentKind,
    pub content: String,
    pub reasoning: String,
    pub source_artifact_ids: Vec<Uuid>,
    pub archive_key: Option<String>,
    pub created_at: DateTime<Utc>,
}
