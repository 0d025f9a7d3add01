// Tailor: turns a scored job plus its ranked evidence into application documents.
// All LLM calls go through llm_client.

pub mod archive;
pub mod generator;
pub mod prompts;

pub use archive::{archive_key, DocumentArchive, S3Archive};
pub use generator::{ClaudeDocumentGenerator, DocumentGenerator, GeneratedDocument, GenerationRequest};
