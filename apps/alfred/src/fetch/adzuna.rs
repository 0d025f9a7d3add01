use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{JobSource, SourceError};
use crate::models::job::RawPosting;

const ADZUNA_SEARCH_URL: &str = "https://api.adzuna.com/v1/api/jobs/us/search";
const MAX_PAGES: u32 = 3;
const RESULTS_PER_PAGE: u32 = 20;
const MAX_DESCRIPTION_CHARS: usize = 4000;

pub const DEFAULT_WHAT: &str = "data engineer";
pub const DEFAULT_WHERE: &str = "New York City";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<AdzunaJob>,
}

#[derive(Debug, Deserialize)]
struct AdzunaJob {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    redirect_url: Option<String>,
    #[serde(default)]
    company: Option<DisplayName>,
    #[serde(default)]
    location: Option<DisplayName>,
}

#[derive(Debug, Deserialize)]
struct DisplayName {
    #[serde(default)]
    display_name: Option<String>,
}

impl AdzunaJob {
    fn into_posting(self) -> RawPosting {
        let description: String = self
            .description
            .unwrap_or_default()
            .chars()
            .take(MAX_DESCRIPTION_CHARS)
            .collect();
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        let mut posting = RawPosting {
            source_id: String::new(),
            source_url: non_empty(self.redirect_url),
            title: non_empty(self.title).unwrap_or_else(|| "Unknown Title".to_string()),
            company: non_empty(self.company.and_then(|c| c.display_name)),
            location: non_empty(self.location.and_then(|l| l.display_name)),
            description,
        };
        posting.source_id = match self.id {
            Some(Value::String(id)) if !id.is_empty() => format!("adzuna:{id}"),
            Some(Value::Number(id)) => format!("adzuna:{id}"),
            // No stable id: fall back to the content fingerprint.
            _ => format!("adzuna:fp:{}", posting.fingerprint()),
        };
        posting
    }
}

/// Adzuna search API. Pages through up to 3 × 20 results.
pub struct AdzunaSource {
    client: Client,
    app_id: String,
    app_key: String,
    what: String,
    location: String,
}

impl AdzunaSource {
    pub fn new(app_id: String, app_key: String, what: String, location: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            app_id,
            app_key,
            what,
            location,
        })
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<AdzunaJob>, SourceError> {
        let per_page = RESULTS_PER_PAGE.to_string();
        let response = self
            .client
            .get(format!("{ADZUNA_SEARCH_URL}/{page}"))
            .query(&[
                ("app_id", self.app_id.as_str()),
                ("app_key", self.app_key.as_str()),
                ("what", self.what.as_str()),
                ("where", self.location.as_str()),
                ("results_per_page", per_page.as_str()),
                ("content-type", "application/json"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.results)
    }
}

#[async_trait]
impl JobSource for AdzunaSource {
    fn name(&self) -> &str {
        "adzuna"
    }

    /// A failure on the first page fails the run. Later pages stop pagination
    /// and keep what was already collected.
    async fn fetch(&self) -> Result<Vec<RawPosting>, SourceError> {
        let mut postings = Vec::new();
        for page in 1..=MAX_PAGES {
            let results = match self.fetch_page(page).await {
                Ok(results) => results,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!("Adzuna page {page} failed, keeping {} postings: {e}", postings.len());
                    break;
                }
            };
            if results.is_empty() {
                break;
            }
            postings.extend(results.into_iter().map(AdzunaJob::into_posting));
        }
        info!(
            "Adzuna returned {} postings for '{}' in '{}'",
            postings.len(),
            self.what,
            self.location
        );
        Ok(postings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(json: &str) -> AdzunaJob {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_into_posting_maps_fields() {
        let posting = job(
            r#"{
                "id": "4312",
                "title": "Data Engineer",
                "description": "Build pipelines",
                "redirect_url": "https://adzuna.example/4312",
                "company": {"display_name": "Acme"},
                "location": {"display_name": "New York, NY"}
            }"#,
        )
        .into_posting();
        assert_eq!(posting.source_id, "adzuna:4312");
        assert_eq!(posting.company.as_deref(), Some("Acme"));
        assert_eq!(posting.location.as_deref(), Some("New York, NY"));
        assert_eq!(posting.source_url.as_deref(), Some("https://adzuna.example/4312"));
    }

    #[test]
    fn test_numeric_id_and_missing_title() {
        let posting = job(r#"{"id": 99, "description": "x"}"#).into_posting();
        assert_eq!(posting.source_id, "adzuna:99");
        assert_eq!(posting.title, "Unknown Title");
        assert!(posting.company.is_none());
    }

    #[test]
    fn test_missing_id_falls_back_to_fingerprint() {
        let a = job(r#"{"title": "DE", "description": "x"}"#).into_posting();
        let b = job(r#"{"title": "DE", "description": "x", "redirect_url": "https://r/2"}"#)
            .into_posting();
        assert!(a.source_id.starts_with("adzuna:fp:"));
        assert_eq!(a.source_id, b.source_id);
    }

    #[test]
    fn test_description_truncated_on_chars() {
        let long = "é".repeat(MAX_DESCRIPTION_CHARS + 10);
        let posting = job(&format!(r#"{{"id": "1", "description": "{long}"}}"#)).into_posting();
        assert_eq!(posting.description.chars().count(), MAX_DESCRIPTION_CHARS);
    }
}
