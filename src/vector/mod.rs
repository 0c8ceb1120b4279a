/// Vector (semantic) retrieval branch
///
/// Both backends are built from the same `Vec<VectorEntry>`, which is also
/// the persisted form; the search structure is rebuilt on load.
mod flat;
mod hnsw;

pub use flat::FlatIndex;
pub use hnsw::HnswIndex;

use crate::chunking::ChunkMetadata;
use crate::config::{VectorBackend, VectorConfig};
use crate::filter::SearchFilter;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Duplicate vector for chunk {0}")]
    DuplicateId(String),

    #[error("Vector search cancelled")]
    Cancelled,

    #[error("Search failed: {0}")]
    SearchError(String),
}

/// One embedded chunk with the metadata needed to filter it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Nearest-neighbour search over unit vectors
pub trait VectorSearch: Send + Sync {
    /// Top `top_n` entries by cosine similarity as `(chunk_id, similarity)`
    fn search(
        &self,
        query: &[f32],
        top_n: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<(String, f32)>, VectorIndexError> {
        self.search_cancellable(query, top_n, filter, &CancellationToken::new())
    }

    fn search_cancellable(
        &self,
        query: &[f32],
        top_n: usize,
        filter: &SearchFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<(String, f32)>, VectorIndexError>;

    fn entries(&self) -> &[VectorEntry];

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> usize;

    fn generation_id(&self) -> &str;

    fn backend(&self) -> VectorBackend;
}

/// Build the configured backend over `entries`
pub fn build_vector_index(
    entries: Vec<VectorEntry>,
    dimension: usize,
    generation_id: impl Into<String>,
    config: &VectorConfig,
) -> Result<Box<dyn VectorSearch>, VectorIndexError> {
    let generation_id = generation_id.into();
    match config.backend {
        VectorBackend::Exact => Ok(Box::new(FlatIndex::new(entries, dimension, generation_id)?)),
        VectorBackend::Hnsw => Ok(Box::new(HnswIndex::new(
            entries,
            dimension,
            generation_id,
            config,
        )?)),
    }
}

fn check_entries(entries: &[VectorEntry], dimension: usize) -> Result<(), VectorIndexError> {
    let mut seen = ahash::AHashSet::with_capacity(entries.len());
    for entry in entries {
        if entry.vector.len() != dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: dimension,
                actual: entry.vector.len(),
            });
        }
        if !seen.insert(entry.chunk_id.as_str()) {
            return Err(VectorIndexError::DuplicateId(entry.chunk_id.clone()));
        }
    }
    Ok(())
}

fn check_query(query: &[f32], dimension: usize) -> Result<(), VectorIndexError> {
    if query.len() != dimension {
        return Err(VectorIndexError::InvalidDimension {
            expected: dimension,
            actual: query.len(),
        });
    }
    Ok(())
}

/// Similarity descending, then chunk id ascending
fn rank(results: &mut [(String, f32)]) {
    results.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::ingest::DocType;

    pub fn unit(values: &[f32]) -> Vec<f32> {
        let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        values.iter().map(|x| x / norm).collect()
    }

    pub fn entry(chunk_id: &str, product_id: &str, values: &[f32]) -> VectorEntry {
        VectorEntry {
            chunk_id: chunk_id.to_string(),
            vector: unit(values),
            metadata: ChunkMetadata {
                product_id: product_id.to_string(),
                doc_type: DocType::Specification,
                page_number: 1,
            },
        }
    }
}
