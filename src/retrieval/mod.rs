//! Hybrid retrieval
//!
//! Lexical (BM25) and vector search run concurrently against one index
//! generation; their rankings are combined with Reciprocal Rank Fusion,
//! deduplicated, optionally rebalanced across products, and returned with
//! full chunk metadata for citation.

mod deduplication;
pub mod diversity;
mod fusion;
mod hybrid;
pub mod query;
mod result;

pub use deduplication::deduplicate_results;
pub use diversity::ensure_product_diversity;
pub use fusion::{fusion_order, reciprocal_rank_fusion, FusedCandidate};
pub use hybrid::HybridRetriever;
pub use query::{ProductCatalog, QueryAnalysis, QueryAnalyzer, SearchRequest};
pub use result::{Branch, SearchResponse, SearchResult};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error(
        "Embedding model mismatch: index built with {index_model} ({index_dimension} dims), \
         provider is {provider_model} ({provider_dimension} dims)"
    )]
    ModelMismatch {
        index_model: String,
        index_dimension: usize,
        provider_model: String,
        provider_dimension: usize,
    },

    #[error("Retrieval unavailable: {0}")]
    Unavailable(String),

    #[error("Search cancelled")]
    Cancelled,

    #[error("Retrieval configuration error: {0}")]
    Config(String),
}
