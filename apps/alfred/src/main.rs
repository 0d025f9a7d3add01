mod config;
mod db;
mod embeddings;
mod errors;
mod fetch;
mod llm_client;
mod models;
mod parse;
mod pipeline;
mod profile;
mod ranking;
mod routes;
mod state;
mod store;
mod tailor;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, S3Config};
use crate::db::{create_pool, run_migrations};
use crate::embeddings::{Embedder, OpenAiEmbedder};
use crate::fetch::{AdzunaSource, JobSource};
use crate::llm_client::LlmClient;
use crate::parse::{ExtractorBackend, KeywordExtractor, LlmExtractor, TextExtractor};
use crate::pipeline::{worker, Pipeline, Providers, Stores};
use crate::profile::Profile;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::PgStore;
use crate::tailor::{ClaudeDocumentGenerator, DocumentArchive, S3Archive};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Alfred v{}", env!("CARGO_PKG_VERSION"));

    let profile = Profile::load(&config.profile_path)
        .with_context(|| format!("loading profile from {}", config.profile_path.display()))?;
    info!("Profile loaded for {}", profile.full_name);

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;
    let stores = Stores::shared(Arc::new(PgStore::new(db)));

    let embedder = OpenAiEmbedder::new(
        &config.openai_api_key,
        &config.openai_base_url,
        config.embedding_model.clone(),
        config.embedding_dimensions,
    )?;
    info!(
        "Embedding client initialized (model: {}, {} dims)",
        config.embedding_model,
        embedder.dimensions()
    );

    let llm = LlmClient::new(config.anthropic_api_key.clone(), config.llm_model.clone())?;
    info!("LLM client initialized (model: {})", llm.model());

    let extractor: Arc<dyn TextExtractor> = match config.extractor {
        ExtractorBackend::Keyword => Arc::new(KeywordExtractor),
        ExtractorBackend::Llm => Arc::new(LlmExtractor::new(llm.clone())),
    };
    info!("Text extractor: {}", config.extractor);

    let source: Option<Arc<dyn JobSource>> = match &config.adzuna {
        Some(adzuna) => Some(Arc::new(AdzunaSource::new(
            adzuna.app_id.clone(),
            adzuna.app_key.clone(),
            adzuna.what.clone(),
            adzuna.location.clone(),
        )?)),
        None => {
            warn!("ADZUNA_APP_ID/ADZUNA_API_KEY not set; fetching disabled");
            None
        }
    };

    let archive: Option<Arc<dyn DocumentArchive>> = match &config.s3 {
        Some(s3) => {
            let client = build_s3_client(s3).await;
            info!("S3 archive initialized (bucket: {})", s3.bucket);
            Some(Arc::new(S3Archive::new(client, s3.bucket.clone())))
        }
        None => None,
    };

    let pipeline = Pipeline::new(
        stores,
        Providers {
            embedder: Arc::new(embedder),
            extractor,
            generator: Arc::new(ClaudeDocumentGenerator::new(llm)),
            source,
            archive,
        },
        profile,
        config.pipeline_settings(),
    );

    let cancel = CancellationToken::new();
    let workers = if config.workers_enabled {
        worker::spawn_all(&pipeline, &config.worker_settings(), &cancel)
    } else {
        info!("Background workers disabled; pipeline runs only via HTTP triggers");
        Vec::new()
    };

    let app = build_router(AppState { pipeline })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::spawn(watch_signals(cancel.clone()));
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await?;

    info!("HTTP server stopped; waiting for {} workers", workers.len());
    for handle in workers {
        if let Err(e) = handle.await {
            error!("Worker task panicked: {e}");
        }
    }
    info!("Shutdown complete");
    Ok(())
}

/// Cancels `cancel` on Ctrl+C or SIGTERM.
async fn watch_signals(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received; finishing in-flight work");
    cancel.cancel();
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
/// Static credentials are used when both keys are set; otherwise the default
/// provider chain applies.
async fn build_s3_client(s3: &S3Config) -> aws_sdk_s3::Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(s3.region.clone()));

    if let (Some(key_id), Some(secret)) = (&s3.access_key_id, &s3.secret_access_key) {
        loader = loader.credentials_provider(Credentials::new(
            key_id,
            secret,
            None,
            None,
            "alfred-static",
        ));
    }
    if let Some(endpoint) = &s3.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(s3.endpoint.is_some())
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}
