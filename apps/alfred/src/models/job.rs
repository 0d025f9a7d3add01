use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A job posting as stored in the job store.
///
/// `parsed`, `description_embedding` and `match_score` are derived fields.
/// `None` means "not computed yet"; backfill tooling relies on that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub source_id: String,
    pub source_url: Option<String>,
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub description: String,
    pub content_fingerprint: String,
    pub parsed: Option<ParsedPosting>,
    #[serde(skip_serializing)]
    pub description_embedding: Option<Vec<f32>>,
    pub match_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Text fed to the embedding client: title, company, then description.
    pub fn embedding_text(&self) -> String {
        format!(
            "{}\n{}\n{}",
            self.title,
            self.company.as_deref().unwrap_or(""),
            self.description
        )
    }

    /// Union of parsed skills, or `None` when Parse has not produced any.
    pub fn skills(&self) -> Option<&[String]> {
        self.parsed
            .as_ref()
            .map(|p| p.skills.all.as_slice())
            .filter(|s| !s.is_empty())
    }
}

/// A posting as delivered by a job source, before it becomes a `Job`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPosting {
    pub source_id: String,
    pub source_url: Option<String>,
    pub title: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub description: String,
}

impl RawPosting {
    /// SHA-256 over the content fields. Survives URL churn on the source side.
    pub fn fingerprint(&self) -> String {
        let key = format!(
            "{}|{}|{}|{}",
            self.title.trim(),
            self.company.as_deref().unwrap_or("").trim(),
            self.location.as_deref().unwrap_or("").trim(),
            self.description.trim()
        )
        .to_lowercase();
        format!("{:x}", Sha256::digest(key.as_bytes()))
    }
}

/// Structured fields produced by the Parse stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedPosting {
    pub skills: SkillSet,
    pub requirements: Vec<Requirement>,
    pub seniority: Option<String>,
}

/// Skills grouped by category, plus the deduplicated union in `all`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillSet {
    pub by_category: BTreeMap<String, Vec<String>>,
    pub all: Vec<String>,
}

impl SkillSet {
    /// Builds a skill set from raw category lists: lowercases, trims, dedups,
    /// and rebuilds `all` as the union.
    pub fn from_categories<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<S>)>,
        S: AsRef<str>,
    {
        let mut by_category = BTreeMap::new();
        let mut all = Vec::new();
        for (category, values) in categories {
            let mut cleaned: Vec<String> = values
                .iter()
                .map(|v| v.as_ref().trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .collect();
            cleaned.sort();
            cleaned.dedup();
            if cleaned.is_empty() {
                continue;
            }
            all.extend(cleaned.iter().cloned());
            by_category.insert(category, cleaned);
        }
        all.sort();
        all.dedup();
        Self { by_category, all }
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub text: String,
    pub is_required: bool,
}

/// What a re-fetch does when a known posting's content changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefetchPolicy {
    /// Clear parsed fields, embedding and score, and send the job back through Parse.
    #[default]
    RescoreOnChange,
    /// Update the posting fields only; derived fields keep their old values.
    KeepScore,
}

impl RefetchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefetchPolicy::RescoreOnChange => "rescore_on_change",
            RefetchPolicy::KeepScore => "keep_score",
        }
    }
}

impl fmt::Display for RefetchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefetchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rescore_on_change" => Ok(RefetchPolicy::RescoreOnChange),
            "keep_score" => Ok(RefetchPolicy::KeepScore),
            other => Err(format!("unknown refetch policy '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(description: &str) -> RawPosting {
        RawPosting {
            source_id: "adzuna:1".to_string(),
            source_url: Some("https://example.com/1".to_string()),
            title: "Data Engineer".to_string(),
            company: Some("Acme".to_string()),
            location: Some("New York".to_string()),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_fingerprint_ignores_url_and_case() {
        let a = posting("Build ETL pipelines");
        let mut b = posting("build etl pipelines");
        b.source_url = Some("https://example.com/redirect/99".to_string());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_description() {
        assert_ne!(
            posting("Build ETL pipelines").fingerprint(),
            posting("Build React apps").fingerprint()
        );
    }

    #[test]
    fn test_skill_set_union_is_sorted_and_deduped() {
        let set = SkillSet::from_categories(vec![
            ("languages".to_string(), vec!["Python", " sql "]),
            ("databases".to_string(), vec!["SQL", "postgres"]),
            ("cloud".to_string(), Vec::<&str>::new()),
        ]);
        assert_eq!(set.all, vec!["postgres", "python", "sql"]);
        assert!(!set.by_category.contains_key("cloud"));
    }

    #[test]
    fn test_refetch_policy_parses() {
        assert_eq!(
            "keep_score".parse::<RefetchPolicy>().unwrap(),
            RefetchPolicy::KeepScore
        );
        assert!("sometimes".parse::<RefetchPolicy>().is_err());
    }
}
