use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tracing::info;

use crate::models::generated::GeneratedArtifact;

/// Object storage for generated documents. Optional: when no archive is
/// configured, documents live only in the database.
#[async_trait]
pub trait DocumentArchive: Send + Sync {
    async fn put(&self, key: &str, body: &str) -> anyhow::Result<()>;
}

/// `generated/{job_id}/{persona}/{kind}/{id}.md`
pub fn archive_key(generated: &GeneratedArtifact) -> String {
    format!(
        "generated/{}/{}/{}/{}.md",
        generated.job_id,
        sanitize_segment(&generated.persona),
        generated.kind,
        generated.id
    )
}

fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

pub struct S3Archive {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Archive {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl DocumentArchive for S3Archive {
    async fn put(&self, key: &str, body: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body.as_bytes().to_vec()))
            .content_type("text/markdown")
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("S3 upload failed: {e}"))?;
        info!("Archived document to s3://{}/{}", self.bucket, key);
        Ok(())
    }
}
