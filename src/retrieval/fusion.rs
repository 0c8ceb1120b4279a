//! Reciprocal Rank Fusion for combining the lexical and vector rankings

use ahash::AHashMap;
use std::cmp::Ordering;

/// One chunk after fusion, with its position in each branch
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub chunk_id: String,
    pub rrf_score: f64,
    /// 1-based; `None` when the branch did not return the chunk
    pub lexical_rank: Option<usize>,
    pub vector_rank: Option<usize>,
    pub lexical_score: Option<f32>,
    pub vector_score: Option<f32>,
}

/// Fusion order: score descending, then chunk id ascending
pub fn fusion_order(a_score: f64, a_id: &str, b_score: f64, b_id: &str) -> Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a_id.cmp(b_id))
}

/// Apply Reciprocal Rank Fusion to the two branch rankings
///
/// RRF formula: score(id) = sum over the branches containing id of
/// 1 / (k + rank), ranks starting at 1. A chunk listed twice by one branch
/// keeps its better rank. Every chunk appears once in the output.
pub fn reciprocal_rank_fusion(
    lexical: &[(String, f32)],
    vector: &[(String, f32)],
    rrf_k: u32,
) -> Vec<FusedCandidate> {
    let mut positions: AHashMap<&str, usize> = AHashMap::new();
    let mut fused: Vec<FusedCandidate> = Vec::with_capacity(lexical.len() + vector.len());

    let k = f64::from(rrf_k);

    for (index, (chunk_id, score)) in lexical.iter().enumerate() {
        let i = slot(&mut positions, &mut fused, chunk_id);
        if fused[i].lexical_rank.is_none() {
            let rank = index + 1;
            fused[i].lexical_rank = Some(rank);
            fused[i].lexical_score = Some(*score);
            fused[i].rrf_score += 1.0 / (k + rank as f64);
        }
    }

    for (index, (chunk_id, score)) in vector.iter().enumerate() {
        let i = slot(&mut positions, &mut fused, chunk_id);
        if fused[i].vector_rank.is_none() {
            let rank = index + 1;
            fused[i].vector_rank = Some(rank);
            fused[i].vector_score = Some(*score);
            fused[i].rrf_score += 1.0 / (k + rank as f64);
        }
    }

    fused.sort_by(|a, b| fusion_order(a.rrf_score, &a.chunk_id, b.rrf_score, &b.chunk_id));
    fused
}

fn slot<'a>(
    positions: &mut AHashMap<&'a str, usize>,
    fused: &mut Vec<FusedCandidate>,
    chunk_id: &'a str,
) -> usize {
    *positions.entry(chunk_id).or_insert_with(|| {
        fused.push(FusedCandidate {
            chunk_id: chunk_id.to_string(),
            rrf_score: 0.0,
            lexical_rank: None,
            vector_rank: None,
            lexical_score: None,
            vector_score: None,
        });
        fused.len() - 1
    })
}
