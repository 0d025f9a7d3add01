use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ResumeBullet,
    Project,
    WritingSample,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::ResumeBullet => "resume_bullet",
            ArtifactKind::Project => "project",
            ArtifactKind::WritingSample => "writing_sample",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resume_bullet" => Ok(ArtifactKind::ResumeBullet),
            "project" => Ok(ArtifactKind::Project),
            "writing_sample" => Ok(ArtifactKind::WritingSample),
            other => Err(format!("unknown artifact kind '{other}'")),
        }
    }
}

/// A unit of personal career evidence.
///
/// `revision` increases on every content edit. An embedding is only ever
/// written against the revision it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub name: String,
    pub kind: ArtifactKind,
    pub content: String,
    pub source: Option<String>,
    pub revision: i32,
    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewArtifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub content: String,
    pub source: Option<String>,
}
