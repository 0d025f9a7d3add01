use tracing::debug;

use crate::embeddings::Embedder;
use crate::errors::PipelineError;
use crate::models::artifact::Artifact;
use crate::parse::clean_text;
use crate::store::ArtifactStore;

/// Returns the artifact's embedding, computing and caching it only when absent.
///
/// The cache write is conditional on the revision read here. If a profile
/// edit landed in between, the write is discarded and the vector is used for
/// this ranking only; the next run embeds the new revision.
pub async fn ensure_embedded(
    store: &dyn ArtifactStore,
    embedder: &dyn Embedder,
    artifact: &Artifact,
) -> Result<Vec<f32>, PipelineError> {
    if let Some(embedding) = &artifact.embedding {
        return Ok(embedding.clone());
    }

    let vector = embedder.embed(&clean_text(&artifact.content)).await?;
    let stored = store
        .store_embedding(artifact.id, artifact.revision, &vector)
        .await?;
    if stored {
        debug!(
            "Cached embedding for artifact {} rev {}",
            artifact.id, artifact.revision
        );
    } else {
        debug!(
            "Discarded stale embedding for artifact {} rev {}",
            artifact.id, artifact.revision
        );
    }
    Ok(vector)
}
