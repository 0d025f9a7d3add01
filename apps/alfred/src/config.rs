use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::models::generated::DocumentKind;
use crate::models::job::RefetchPolicy;
use crate::parse::ExtractorBackend;
use crate::pipeline::worker::WorkerSettings;
use crate::pipeline::{PipelineSettings, DEFAULT_PERSONA, DEFAULT_TAILOR_MIN_SCORE};
use crate::ranking::engine::{DEFAULT_SNIPPET_CHARS, DEFAULT_TOP_K};
use crate::ranking::{RankSettings, ScoringWeights};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

/// Object storage for generated documents. Absent unless `S3_BUCKET` is set.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Adzuna job source. Absent unless both app id and key are set.
#[derive(Debug, Clone)]
pub struct AdzunaConfig {
    pub app_id: String,
    pub app_key: String,
    pub what: String,
    pub location: String,
}

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a knob does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub llm_model: Option<String>,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub s3: Option<S3Config>,
    pub adzuna: Option<AdzunaConfig>,
    pub profile_path: PathBuf,
    pub extractor: ExtractorBackend,
    pub port: u16,
    pub rust_log: String,

    pub top_k: usize,
    pub similarity_weight: f64,
    pub skill_overlap_weight: f64,
    pub snippet_chars: usize,
    pub tailor_min_score: f64,
    pub tailor_kinds: Vec<DocumentKind>,
    pub tailor_persona: String,
    pub refetch_policy: RefetchPolicy,
    pub liveness_timeout: Duration,
    pub max_attempts: i32,

    pub workers_enabled: bool,
    pub workers_per_stage: usize,
    pub poll_interval: Duration,
    pub fetch_interval: Duration,
    pub reconcile_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let s3 = env.get("S3_BUCKET").map(|bucket| S3Config {
            bucket,
            endpoint: env.get("S3_ENDPOINT"),
            region: env.get("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            access_key_id: env.get("AWS_ACCESS_KEY_ID"),
            secret_access_key: env.get("AWS_SECRET_ACCESS_KEY"),
        });

        let adzuna = match (env.get("ADZUNA_APP_ID"), env.get("ADZUNA_API_KEY")) {
            (Some(app_id), Some(app_key)) => Some(AdzunaConfig {
                app_id,
                app_key,
                what: env
                    .get("ADZUNA_WHAT")
                    .unwrap_or_else(|| crate::fetch::adzuna::DEFAULT_WHAT.to_string()),
                location: env
                    .get("ADZUNA_WHERE")
                    .unwrap_or_else(|| crate::fetch::adzuna::DEFAULT_WHERE.to_string()),
            }),
            _ => None,
        };

        let tailor_kinds = match env.get("TAILOR_KINDS") {
            Some(raw) => raw
                .split(',')
                .filter(|kind| !kind.trim().is_empty())
                .map(|kind| kind.parse::<DocumentKind>().map_err(anyhow::Error::msg))
                .collect::<Result<Vec<_>>>()
                .context("TAILOR_KINDS must be a comma-separated list of document kinds")?,
            None => vec![DocumentKind::Resume, DocumentKind::CoverLetter],
        };

        Ok(Config {
            database_url: env.require("DATABASE_URL")?,
            anthropic_api_key: env.require("ANTHROPIC_API_KEY")?,
            llm_model: env.get("LLM_MODEL"),
            openai_api_key: env.require("OPENAI_API_KEY")?,
            openai_base_url: env
                .get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            embedding_model: env
                .get("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimensions: env.parse_or("EMBEDDING_DIMENSIONS", DEFAULT_EMBEDDING_DIMENSIONS)?,
            s3,
            adzuna,
            profile_path: env
                .get("PROFILE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("profile.json")),
            extractor: env.parse_or("EXTRACTOR", ExtractorBackend::Keyword)?,
            port: env.parse_or("PORT", 8080)?,
            rust_log: env.get("RUST_LOG").unwrap_or_else(|| "info".to_string()),

            top_k: env.parse_or("MATCH_TOP_K", DEFAULT_TOP_K)?,
            similarity_weight: env.parse_or("SIMILARITY_WEIGHT", ScoringWeights::default().similarity)?,
            skill_overlap_weight: env
                .parse_or("SKILL_OVERLAP_WEIGHT", ScoringWeights::default().skill_overlap)?,
            snippet_chars: env.parse_or("SNIPPET_CHARS", DEFAULT_SNIPPET_CHARS)?,
            tailor_min_score: env.parse_or("TAILOR_MIN_SCORE", DEFAULT_TAILOR_MIN_SCORE)?,
            tailor_kinds,
            tailor_persona: env
                .get("TAILOR_PERSONA")
                .unwrap_or_else(|| DEFAULT_PERSONA.to_string()),
            refetch_policy: env.parse_or("REFETCH_POLICY", RefetchPolicy::default())?,
            liveness_timeout: Duration::from_secs(env.parse_or("LIVENESS_TIMEOUT_SECS", 900)?),
            max_attempts: env.parse_or("MAX_ATTEMPTS", 3)?,

            workers_enabled: env.parse_or("WORKERS_ENABLED", true)?,
            workers_per_stage: env.parse_or("WORKERS_PER_STAGE", 1)?,
            poll_interval: Duration::from_secs(env.parse_or("POLL_INTERVAL_SECS", 5)?),
            fetch_interval: Duration::from_secs(env.parse_or("FETCH_INTERVAL_SECS", 3600)?),
            reconcile_interval: Duration::from_secs(env.parse_or("RECONCILE_INTERVAL_SECS", 60)?),
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            rank: RankSettings {
                top_k: self.top_k,
                weights: ScoringWeights {
                    similarity: self.similarity_weight,
                    skill_overlap: self.skill_overlap_weight,
                },
                snippet_chars: self.snippet_chars,
            },
            tailor_min_score: self.tailor_min_score,
            tailor_kinds: self.tailor_kinds.clone(),
            default_persona: self.tailor_persona.clone(),
            refetch_policy: self.refetch_policy,
            liveness_timeout: self.liveness_timeout,
            max_attempts: self.max_attempts,
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            workers_per_stage: self.workers_per_stage,
            poll_interval: self.poll_interval,
            fetch_interval: self.fetch_interval,
            reconcile_interval: self.reconcile_interval,
        }
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .with_context(|| format!("Required environment variable '{key}' is not set"))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{key} has invalid value '{raw}': {e}")),
            None => Ok(default),
        }
    }
}
