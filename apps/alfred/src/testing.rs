//! Deterministic fakes for pipeline and route tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::embeddings::{Embedder, EmbeddingError};
use crate::fetch::{JobSource, SourceError};
use crate::models::generated::DocumentKind;
use crate::models::job::RawPosting;
use crate::parse::KeywordExtractor;
use crate::pipeline::{Pipeline, PipelineSettings, Providers, Stores};
use crate::profile::Profile;
use crate::store::MemoryStore;
use crate::tailor::generator::GenerationError;
use crate::tailor::{DocumentArchive, DocumentGenerator, GeneratedDocument, GenerationRequest};

pub const TEST_DIMENSIONS: usize = 512;

/// Bag-of-words embedder: each lowercase token adds 1.0 at an FNV-1a bucket.
/// Shared vocabulary means positive cosine; disjoint vocabulary means ~0.
#[derive(Default)]
pub struct HashEmbedder {
    calls: Mutex<Vec<String>>,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every text embedded so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_containing(&self, needle: &str) -> usize {
        self.calls().iter().filter(|t| t.contains(needle)).count()
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        TEST_DIMENSIONS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.lock().unwrap().push(text.to_string());
        let mut vector = vec![0.0_f32; TEST_DIMENSIONS];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[(fnv1a(token) % TEST_DIMENSIONS as u64) as usize] += 1.0;
        }
        Ok(vector)
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn dimensions(&self) -> usize {
        TEST_DIMENSIONS
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Api {
            status: 503,
            message: "overloaded".to_string(),
        })
    }
}

/// Counts calls. When gated, each call signals `started` and then waits for
/// `release` before returning.
#[derive(Default)]
pub struct CountingGenerator {
    calls: AtomicUsize,
    gated: bool,
    fail: bool,
    fail_kind: Option<DocumentKind>,
    pub started: Notify,
    pub release: Notify,
}

impl CountingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Fails only for `kind`.
    pub fn failing_for(kind: DocumentKind) -> Self {
        Self {
            fail_kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentGenerator for CountingGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<GeneratedDocument, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.gated {
            self.started.notify_one();
            self.release.notified().await;
        }
        if self.fail || self.fail_kind == Some(request.variant.kind) {
            return Err(GenerationError::EmptyDocument);
        }
        Ok(GeneratedDocument {
            document: format!(
                "# {} for {}\nEvidence: {}",
                request.variant.kind,
                request.job.title,
                request.matches.len()
            ),
            reasoning: format!("used {} snippets", request.matches.len()),
        })
    }
}

/// Returns whatever postings were last set.
#[derive(Default)]
pub struct StaticSource {
    postings: Mutex<Vec<RawPosting>>,
}

impl StaticSource {
    pub fn set(&self, postings: Vec<RawPosting>) {
        *self.postings.lock().unwrap() = postings;
    }
}

#[async_trait]
impl JobSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<RawPosting>, SourceError> {
        Ok(self.postings.lock().unwrap().clone())
    }
}

/// Archive that records keys, optionally failing every upload.
#[derive(Default)]
pub struct RecordingArchive {
    pub keys: Mutex<Vec<String>>,
    pub fail: bool,
}

#[async_trait]
impl DocumentArchive for RecordingArchive {
    async fn put(&self, key: &str, _body: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("bucket unreachable");
        }
        self.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

pub fn raw_posting(source_id: &str, title: &str, description: &str) -> RawPosting {
    RawPosting {
        source_id: source_id.to_string(),
        source_url: Some(format!("https://jobs.example/{source_id}")),
        title: title.to_string(),
        company: Some("Acme".to_string()),
        location: Some("New York, NY".to_string()),
        description: description.to_string(),
    }
}

/// A pipeline over one `MemoryStore` with handles to every fake.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub embedder: Arc<HashEmbedder>,
    pub generator: Arc<CountingGenerator>,
    pub source: Arc<StaticSource>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(PipelineSettings::default(), CountingGenerator::new())
    }

    pub fn with(settings: PipelineSettings, generator: CountingGenerator) -> Self {
        Self::build(settings, generator, None)
    }

    pub fn with_archive(archive: Arc<dyn DocumentArchive>) -> Self {
        Self::build(PipelineSettings::default(), CountingGenerator::new(), Some(archive))
    }

    fn build(
        settings: PipelineSettings,
        generator: CountingGenerator,
        archive: Option<Arc<dyn DocumentArchive>>,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(HashEmbedder::new());
        let generator = Arc::new(generator);
        let source = Arc::new(StaticSource::default());
        let profile = Profile::from_json(r#"{"full_name": "Sam Rivera", "email": "sam@example.com"}"#)
            .unwrap();
        let pipeline = Pipeline::new(
            Stores::shared(store.clone()),
            Providers {
                embedder: embedder.clone(),
                extractor: Arc::new(KeywordExtractor),
                generator: generator.clone(),
                source: Some(source.clone()),
                archive,
            },
            profile,
            settings,
        );
        Self {
            store,
            embedder,
            generator,
            source,
            pipeline,
        }
    }

    /// Swaps in a different embedder over the same store.
    pub fn with_embedder(&self, embedder: Arc<dyn Embedder>) -> Pipeline {
        Pipeline::new(
            Stores::shared(self.store.clone()),
            Providers {
                embedder,
                extractor: Arc::new(KeywordExtractor),
                generator: self.generator.clone(),
                source: Some(self.source.clone()),
                archive: None,
            },
            Profile::from_json(r#"{"full_name": "Sam Rivera"}"#).unwrap(),
            self.pipeline.settings().clone(),
        )
    }
}
