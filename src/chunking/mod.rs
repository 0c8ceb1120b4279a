//! Page-aware chunking of extracted documents
//!
//! Each page is split independently so every chunk maps to exactly one page
//! for citation. Chunk ids are derived from product, document type, page and
//! position, making re-chunking the same input reproducible.

mod splitter;
pub mod tokens;

pub use tokens::{token_counter_for, HeuristicTokenCounter, HfTokenCounter, TokenCounter};

use crate::config::ChunkingConfig;
use crate::ingest::{DocType, Document};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use splitter::RecursiveSplitter;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ChunkingError {
    #[error("Failed to load tokenizer: {0}")]
    TokenizerLoad(String),

    #[error("Invalid chunk sizes: {0}")]
    InvalidSizes(String),

    #[error("Chunking task failed: {0}")]
    Task(String),
}

/// Filterable attributes carried alongside every indexed chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub product_id: String,
    pub doc_type: DocType,
    pub page_number: u32,
}

/// A citable passage of one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
    pub product_id: String,
    pub doc_type: DocType,
    pub page_number: u32,
    /// Position of the chunk within its page, from 0
    pub chunk_index: u32,
    pub source_file: String,
    pub source_url: Option<String>,
    pub source_name: Option<String>,
}

impl Chunk {
    pub fn make_id(product_id: &str, doc_type: DocType, page_number: u32, chunk_index: u32) -> String {
        format!(
            "{}_{}_p{}_c{}",
            product_id,
            doc_type.as_str(),
            page_number,
            chunk_index
        )
    }

    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            product_id: self.product_id.clone(),
            doc_type: self.doc_type,
            page_number: self.page_number,
        }
    }
}

/// Splits documents into token-bounded, overlapping chunks
#[derive(Clone)]
pub struct Chunker {
    counter: Arc<dyn TokenCounter>,
    target: usize,
    overlap: usize,
    max: usize,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig, counter: Arc<dyn TokenCounter>) -> Result<Self, ChunkingError> {
        let (target, overlap, max) = (
            config.chunk_target_tokens,
            config.chunk_overlap_tokens,
            config.chunk_max_tokens,
        );

        if target == 0 || overlap >= target || max < target {
            return Err(ChunkingError::InvalidSizes(format!(
                "need 0 <= overlap < target <= max, got overlap={} target={} max={}",
                overlap, target, max
            )));
        }

        Ok(Self {
            counter,
            target,
            overlap,
            max,
        })
    }

    /// Chunker with the counter named by the config
    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ChunkingError> {
        let counter = token_counter_for(config.tokenizer_file.as_deref())?;
        Self::new(config, counter)
    }

    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    /// Chunk every page of one document. Blank pages produce nothing.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        let splitter = RecursiveSplitter::new(self.counter.as_ref(), self.target, self.overlap, self.max);
        let mut chunks = Vec::new();

        for page in &document.pages {
            let pieces = splitter.split(&page.text);
            if pieces.is_empty() {
                debug!(
                    "Page {} of {} has no text",
                    page.page_number, document.source_file
                );
                continue;
            }

            for (index, text) in pieces.into_iter().enumerate() {
                let chunk_index = index as u32;
                chunks.push(Chunk {
                    chunk_id: Chunk::make_id(
                        &document.product_id,
                        document.doc_type,
                        page.page_number,
                        chunk_index,
                    ),
                    text,
                    product_id: document.product_id.clone(),
                    doc_type: document.doc_type,
                    page_number: page.page_number,
                    chunk_index,
                    source_file: document.source_file.clone(),
                    source_url: document.source_url.clone(),
                    source_name: document.source_name.clone(),
                });
            }
        }

        chunks
    }

    /// Chunk documents in order, one blocking task per document
    pub async fn chunk_documents(&self, documents: &[Document]) -> Result<Vec<Chunk>, ChunkingError> {
        let mut tasks = Vec::with_capacity(documents.len());
        for document in documents {
            let chunker = self.clone();
            let document = document.clone();
            tasks.push(tokio::task::spawn_blocking(move || chunker.chunk_document(&document)));
        }

        let mut per_document = Vec::with_capacity(tasks.len());
        for task in tasks {
            per_document.push(task.await.map_err(|e| ChunkingError::Task(e.to_string()))?);
        }

        Ok(dedup_chunk_ids(per_document.into_iter().flatten()))
    }
}

/// Collapse chunks sharing an id; the later one replaces the earlier one in
/// place.
pub fn dedup_chunk_ids(chunks: impl IntoIterator<Item = Chunk>) -> Vec<Chunk> {
    let mut positions: AHashMap<String, usize> = AHashMap::new();
    let mut unique: Vec<Chunk> = Vec::new();

    for chunk in chunks {
        match positions.get(&chunk.chunk_id) {
            Some(&position) => {
                warn!(
                    "Chunk id {} produced by both {} and {}; keeping the latter",
                    chunk.chunk_id, unique[position].source_file, chunk.source_file
                );
                unique[position] = chunk;
            }
            None => {
                positions.insert(chunk.chunk_id.clone(), unique.len());
                unique.push(chunk);
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::PageText;

    fn config(target: usize, overlap: usize, max: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_target_tokens: target,
            chunk_overlap_tokens: overlap,
            chunk_max_tokens: max,
            tokenizer_file: None,
        }
    }

    fn chunker(target: usize, overlap: usize, max: usize) -> Chunker {
        Chunker::new(&config(target, overlap, max), Arc::new(HeuristicTokenCounter)).unwrap()
    }

    fn page(page_number: u32, text: &str) -> PageText {
        PageText {
            page_number,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(
            Chunk::make_id("garmin_forerunner_970_2025", DocType::Manual, 14, 0),
            "garmin_forerunner_970_2025_manual_p14_c0"
        );
    }

    #[test]
    fn test_short_page_single_chunk_with_metadata() {
        let document = Document::new(
            "garmin_forerunner_970_2025",
            DocType::Manual,
            "manual.pdf",
            vec![page(
                14,
                "Battery life: up to 26 days in smartwatch mode. GPS mode: up to 26 hours.",
            )],
        );

        let chunks = chunker(800, 200, 1000).chunk_document(&document);
        assert_eq!(chunks.len(), 1);

        let chunk = &chunks[0];
        assert_eq!(chunk.chunk_id, "garmin_forerunner_970_2025_manual_p14_c0");
        assert_eq!(chunk.page_number, 14);
        assert_eq!(chunk.doc_type, DocType::Manual);
        assert!(chunk.text.contains("26 hours"));
    }

    #[test]
    fn test_blank_pages_skipped() {
        let document = Document::new(
            "p",
            DocType::Review,
            "review.pdf",
            vec![page(1, "   \n "), page(2, "Solid build quality."), page(3, "")],
        );

        let chunks = chunker(50, 10, 60).chunk_document(&document);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_id, "p_review_p2_c0");
    }

    #[test]
    fn test_long_page_respects_hard_maximum() {
        let sentence = "The optical heart rate sensor samples continuously during workouts. ";
        let long_text = sentence.repeat(60);
        let document = Document::new("p", DocType::Specification, "spec.pdf", vec![page(3, &long_text)]);

        let chunker = chunker(50, 10, 60);
        let chunks = chunker.chunk_document(&document);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index as usize, i);
            assert!(chunker.counter().count(&chunk.text) <= 60);
        }
    }

    #[test]
    fn test_invalid_sizes_rejected() {
        let result = Chunker::new(&config(100, 100, 120), Arc::new(HeuristicTokenCounter));
        assert!(matches!(result, Err(ChunkingError::InvalidSizes(_))));

        let result = Chunker::new(&config(100, 10, 90), Arc::new(HeuristicTokenCounter));
        assert!(matches!(result, Err(ChunkingError::InvalidSizes(_))));
    }

    #[test]
    fn test_dedup_keeps_later_chunk() {
        let first = Document::new("p", DocType::Review, "reviews/a.pdf", vec![page(1, "first review")]);
        let second = Document::new("p", DocType::Review, "reviews/b.pdf", vec![page(1, "second review")]);

        let chunker = chunker(50, 10, 60);
        let chunks = dedup_chunk_ids(
            chunker
                .chunk_document(&first)
                .into_iter()
                .chain(chunker.chunk_document(&second)),
        );

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source_file, "reviews/b.pdf");
    }

    #[tokio::test]
    async fn test_chunk_documents_preserves_order() {
        let documents = vec![
            Document::new("a", DocType::Manual, "manual.pdf", vec![page(1, "alpha")]),
            Document::new("b", DocType::Manual, "manual.pdf", vec![page(1, "beta")]),
        ];

        let chunks = chunker(50, 10, 60).chunk_documents(&documents).await.unwrap();
        let ids: Vec<_> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a_manual_p1_c0", "b_manual_p1_c0"]);
    }
}
