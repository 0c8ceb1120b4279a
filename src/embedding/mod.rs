/// Embedding generation for chunks and queries
///
/// Architecture:
/// - EmbeddingProvider trait for abstraction
/// - FastEmbedProvider for local multilingual models (384-dim by default)
/// - HashEmbedder for offline, download-free operation
/// - EmbeddingGenerator for batched, bounded-concurrency embedding with
///   per-item failure isolation
mod batch;
mod provider;

pub use batch::{l2_normalize, EmbeddingFailure, EmbeddingGenerator, EmbeddingReport};
pub use provider::{
    provider_for_model, EmbeddingError, EmbeddingProvider, FastEmbedProvider, HashEmbedder,
    DEFAULT_MODEL,
};
