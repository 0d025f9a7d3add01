// Retrieval ranking: cosine similarity over the artifact corpus, optionally
// blended with dictionary skill overlap.
// No store or network access outside `corpus`.

pub mod corpus;
pub mod engine;
pub mod scoring;
pub mod similarity;

pub use corpus::ensure_embedded;
pub use engine::{ArtifactMatch, MatchReport, RankSettings};
pub use scoring::ScoringWeights;
