//! Search results with everything needed to cite them

use super::fusion::{fusion_order, FusedCandidate};
use crate::chunking::Chunk;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A fused hit, denormalized with its chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,

    /// Reciprocal rank fusion score
    pub rrf_score: f64,

    /// 1-based rank in each branch; `None` when absent from that branch
    pub lexical_rank: Option<usize>,
    pub vector_rank: Option<usize>,

    /// Raw branch scores (BM25, cosine similarity)
    pub lexical_score: Option<f32>,
    pub vector_score: Option<f32>,

    pub chunk: Chunk,
}

impl SearchResult {
    pub fn from_candidate(candidate: FusedCandidate, chunk: Chunk) -> Self {
        Self {
            chunk_id: candidate.chunk_id,
            rrf_score: candidate.rrf_score,
            lexical_rank: candidate.lexical_rank,
            vector_rank: candidate.vector_rank,
            lexical_score: candidate.lexical_score,
            vector_score: candidate.vector_score,
            chunk,
        }
    }

    /// `"<product>, <doc type>, page <n>"`
    pub fn citation_label(&self) -> String {
        format!(
            "{}, {}, page {}",
            self.chunk.product_id, self.chunk.doc_type, self.chunk.page_number
        )
    }

    /// Get a short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        let text = self.chunk.text.replace('\n', " ");
        if text.chars().count() <= max_chars {
            text
        } else {
            let cut: String = text.chars().take(max_chars).collect();
            format!("{}...", cut.trim_end())
        }
    }

    pub fn fusion_cmp(&self, other: &Self) -> Ordering {
        fusion_order(self.rrf_score, &self.chunk_id, other.rrf_score, &other.chunk_id)
    }
}

/// A retrieval branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Lexical,
    Vector,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexical => f.write_str("lexical"),
            Self::Vector => f.write_str("vector"),
        }
    }
}

/// Results of one query against one generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub generation_id: String,
    pub results: Vec<SearchResult>,
    /// The branch that failed, when results come from the other one alone
    pub degraded: Option<Branch>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::DocType;

    fn result(text: &str) -> SearchResult {
        SearchResult {
            chunk_id: "garmin_forerunner_970_2025_manual_p14_c0".to_string(),
            rrf_score: 0.03,
            lexical_rank: Some(1),
            vector_rank: None,
            lexical_score: Some(4.2),
            vector_score: None,
            chunk: Chunk {
                chunk_id: "garmin_forerunner_970_2025_manual_p14_c0".to_string(),
                text: text.to_string(),
                product_id: "garmin_forerunner_970_2025".to_string(),
                doc_type: DocType::Manual,
                page_number: 14,
                chunk_index: 0,
                source_file: "manual.pdf".to_string(),
                source_url: None,
                source_name: None,
            },
        }
    }

    #[test]
    fn test_citation_label() {
        assert_eq!(
            result("x").citation_label(),
            "garmin_forerunner_970_2025, manual, page 14"
        );
    }

    #[test]
    fn test_preview_truncates_on_chars() {
        let r = result("Größe\nund Gewicht des Gehäuses");
        assert_eq!(r.preview(100), "Größe und Gewicht des Gehäuses");
        assert_eq!(r.preview(9), "Größe und...");
    }
}
