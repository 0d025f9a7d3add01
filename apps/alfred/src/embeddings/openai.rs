use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Embedder, EmbeddingError};

const MAX_RETRIES: u32 = 3;

/// Embeddings client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        dimensions: usize,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing embedding API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing embedding model name");

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimensions,
        })
    }

    async fn request_once(&self, text: &str) -> Result<Vec<f32>, AttemptError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| AttemptError::Retry(EmbeddingError::Http(e)))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Retry(EmbeddingError::Api {
                status: status.as_u16(),
                message: body,
            }));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Fatal(EmbeddingError::Api {
                status: status.as_u16(),
                message: body,
            }));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Fatal(EmbeddingError::Http(e)))?;
        parse_embedding(parsed, self.dimensions).map_err(AttemptError::Fatal)
    }
}

enum AttemptError {
    Retry(EmbeddingError),
    Fatal(EmbeddingError),
}

fn parse_embedding(
    response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<f32>, EmbeddingError> {
    let vector = response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or(EmbeddingError::Empty)?;
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(vector)
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Blank text maps to the zero vector without a remote call.
    /// Retries on 429 and 5xx with exponential backoff.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimensions]);
        }

        let mut last_error: Option<EmbeddingError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Embedding attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match self.request_once(text).await {
                Ok(vector) => {
                    debug!("Embedded {} chars with {}", text.len(), self.model);
                    return Ok(vector);
                }
                Err(AttemptError::Retry(e)) => last_error = Some(e),
                Err(AttemptError::Fatal(e)) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(EmbeddingError::RetriesExhausted {
            retries: MAX_RETRIES,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> EmbeddingResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_embedding_takes_first_datum() {
        let parsed = response(
            r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.1,0.2,0.3]}],"model":"m"}"#,
        );
        assert_eq!(parse_embedding(parsed, 3).unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_parse_embedding_rejects_wrong_dimension() {
        let parsed = response(r#"{"data":[{"embedding":[0.1,0.2]}]}"#);
        assert!(matches!(
            parse_embedding(parsed, 3),
            Err(EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_parse_embedding_empty_data() {
        let parsed = response(r#"{"data":[]}"#);
        assert!(matches!(parse_embedding(parsed, 3), Err(EmbeddingError::Empty)));
    }

    #[tokio::test]
    async fn test_blank_text_is_zero_vector_without_network() {
        let embedder = OpenAiEmbedder::new(
            "sk-test",
            "http://127.0.0.1:9",
            "text-embedding-3-small".to_string(),
            4,
        )
        .unwrap();
        assert_eq!(embedder.embed("   \n").await.unwrap(), vec![0.0; 4]);
    }

    #[test]
    fn test_new_rejects_blank_key() {
        assert!(OpenAiEmbedder::new(" ", "https://api.openai.com/v1", "m".into(), 4).is_err());
    }
}
