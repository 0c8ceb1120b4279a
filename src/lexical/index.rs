//! BM25 inverted index over chunks
//!
//! Terms map to postings lists of (document ordinal, term frequency).
//! Ordinals index the parallel `chunk_ids`, `doc_lengths` and `metadata`
//! tables. The index is built once per generation and never mutated.

use super::{tokenize, LexicalIndexError};
use crate::chunking::{Chunk, ChunkMetadata};
use crate::config::LexicalConfig;
use crate::filter::SearchFilter;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Postings between cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

impl From<&LexicalConfig> for Bm25Params {
    fn from(config: &LexicalConfig) -> Self {
        Self {
            k1: config.bm25_k1,
            b: config.bm25_b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc: u32,
    pub tf: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalIndex {
    generation_id: String,
    params: Bm25Params,
    chunk_ids: Vec<String>,
    metadata: Vec<ChunkMetadata>,
    doc_lengths: Vec<u32>,
    avg_doc_length: f32,
    postings: BTreeMap<String, Vec<Posting>>,
}

impl LexicalIndex {
    /// Index every chunk. An empty slice gives an index that matches nothing.
    pub fn build(chunks: &[Chunk], params: Bm25Params, generation_id: impl Into<String>) -> Self {
        let mut postings: BTreeMap<String, Vec<Posting>> = BTreeMap::new();
        let mut doc_lengths = Vec::with_capacity(chunks.len());
        let mut total_length: u64 = 0;

        for (ordinal, chunk) in chunks.iter().enumerate() {
            let tokens = tokenize(&chunk.text);
            doc_lengths.push(tokens.len() as u32);
            total_length += tokens.len() as u64;

            let mut frequencies: AHashMap<&str, u32> = AHashMap::new();
            for token in &tokens {
                *frequencies.entry(token.as_str()).or_insert(0) += 1;
            }

            for (term, tf) in frequencies {
                postings.entry(term.to_string()).or_default().push(Posting {
                    doc: ordinal as u32,
                    tf,
                });
            }
        }

        // Ordinal order inside each list keeps serialized output stable
        for list in postings.values_mut() {
            list.sort_by_key(|p| p.doc);
        }

        let avg_doc_length = if chunks.is_empty() {
            0.0
        } else {
            total_length as f32 / chunks.len() as f32
        };

        Self {
            generation_id: generation_id.into(),
            params,
            chunk_ids: chunks.iter().map(|c| c.chunk_id.clone()).collect(),
            metadata: chunks.iter().map(Chunk::metadata).collect(),
            doc_lengths,
            avg_doc_length,
            postings,
        }
    }

    pub fn generation_id(&self) -> &str {
        &self.generation_id
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn chunk_ids(&self) -> &[String] {
        &self.chunk_ids
    }

    pub fn len(&self) -> usize {
        self.chunk_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_ids.is_empty()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// `ln(1 + (N - df + 0.5) / (df + 0.5))`, positive for every df <= N
    fn idf(&self, df: usize) -> f32 {
        let n = self.chunk_ids.len() as f32;
        let df = df as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Top `top_n` chunks for the query tokens as `(chunk_id, score)`
    pub fn search(&self, query_tokens: &[String], top_n: usize, filter: &SearchFilter) -> Vec<(String, f32)> {
        self.search_cancellable(query_tokens, top_n, filter, &CancellationToken::new())
            .unwrap_or_default()
    }

    /// Like [`search`](Self::search), stopping early once `cancel` fires
    pub fn search_cancellable(
        &self,
        query_tokens: &[String],
        top_n: usize,
        filter: &SearchFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<(String, f32)>, LexicalIndexError> {
        if query_tokens.is_empty() || self.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let allowed: Option<Vec<bool>> = if filter.is_empty() {
            None
        } else {
            Some(self.metadata.iter().map(|m| filter.matches(m)).collect())
        };

        let Bm25Params { k1, b } = self.params;
        let avg_len = if self.avg_doc_length > 0.0 {
            self.avg_doc_length
        } else {
            1.0
        };

        let mut scores = vec![0.0f32; self.chunk_ids.len()];
        let mut matched = vec![false; self.chunk_ids.len()];
        let mut visited = 0usize;

        // Repeated query tokens are scored once per occurrence
        for token in query_tokens {
            if cancel.is_cancelled() {
                return Err(LexicalIndexError::Cancelled);
            }

            let Some(list) = self.postings.get(token) else {
                continue;
            };
            let idf = self.idf(list.len());

            for posting in list {
                visited += 1;
                if visited % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                    return Err(LexicalIndexError::Cancelled);
                }

                let doc = posting.doc as usize;
                if allowed.as_ref().is_some_and(|mask| !mask[doc]) {
                    continue;
                }

                let tf = posting.tf as f32;
                let len_norm = 1.0 - b + b * self.doc_lengths[doc] as f32 / avg_len;
                scores[doc] += idf * (tf * (k1 + 1.0)) / (tf + k1 * len_norm);
                matched[doc] = true;
            }
        }

        let mut results: Vec<(usize, f32)> = matched
            .iter()
            .enumerate()
            .filter(|(_, hit)| **hit)
            .map(|(doc, _)| (doc, scores[doc]))
            .collect();

        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.chunk_ids[a.0].cmp(&self.chunk_ids[b.0]))
        });
        results.truncate(top_n);

        Ok(results
            .into_iter()
            .map(|(doc, score)| (self.chunk_ids[doc].clone(), score))
            .collect())
    }

    /// Structural checks for an index read back from disk
    pub fn check_integrity(&self) -> Result<(), LexicalIndexError> {
        let n = self.chunk_ids.len();
        if self.doc_lengths.len() != n || self.metadata.len() != n {
            return Err(LexicalIndexError::Corrupt(format!(
                "table sizes disagree: {} ids, {} lengths, {} metadata rows",
                n,
                self.doc_lengths.len(),
                self.metadata.len()
            )));
        }

        for (term, list) in &self.postings {
            if let Some(bad) = list.iter().find(|p| p.doc as usize >= n || p.tf == 0) {
                return Err(LexicalIndexError::Corrupt(format!(
                    "term '{}' has invalid posting {:?}",
                    term, bad
                )));
            }
        }

        Ok(())
    }
}
