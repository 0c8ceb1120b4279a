//! Product diversity for comparison queries
//!
//! A comparison answer needs evidence for every product involved. When one
//! product dominates the fused ranking, its weakest results give way to the
//! best-ranked results of under-represented products.

use super::SearchResult;
use ahash::AHashMap;

/// Minimum results per product for a result list of `top_k`
pub fn min_per_product(top_k: usize) -> usize {
    (top_k / 3).max(1)
}

/// Take the top `top_k` of `ranked` (fusion order), then swap in results for
/// products below the per-product minimum. Returns results in fusion order.
pub fn ensure_product_diversity(ranked: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
    if ranked.len() <= top_k {
        return ranked;
    }

    let minimum = min_per_product(top_k);

    // Products in order of their best candidate
    let mut products: Vec<String> = Vec::new();
    for result in &ranked {
        if !products.contains(&result.chunk.product_id) {
            products.push(result.chunk.product_id.clone());
        }
    }

    let mut ranked = ranked;
    let mut reserve = ranked.split_off(top_k);
    let mut selected = ranked;

    let mut counts: AHashMap<String, usize> = AHashMap::new();
    for result in &selected {
        *counts.entry(result.chunk.product_id.clone()).or_insert(0) += 1;
    }

    for product in &products {
        while counts.get(product).copied().unwrap_or(0) < minimum {
            let Some(incoming) = reserve.iter().position(|r| r.chunk.product_id == *product) else {
                break;
            };

            // Lowest-ranked result of a product that can spare one
            let Some(outgoing) = selected
                .iter()
                .rposition(|r| counts.get(&r.chunk.product_id).copied().unwrap_or(0) > minimum)
            else {
                break;
            };

            let removed = selected.remove(outgoing);
            if let Some(count) = counts.get_mut(&removed.chunk.product_id) {
                *count -= 1;
            }

            let added = reserve.remove(incoming);
            *counts.entry(added.chunk.product_id.clone()).or_insert(0) += 1;
            tracing::debug!(
                "Diversity: {} replaces {} for product {}",
                added.chunk_id,
                removed.chunk_id,
                product
            );
            selected.push(added);
        }
    }

    selected.sort_by(|a, b| a.fusion_cmp(b));
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::Chunk;
    use crate::ingest::DocType;

    fn result(chunk_id: &str, product_id: &str, rrf_score: f64) -> SearchResult {
        SearchResult {
            chunk_id: chunk_id.to_string(),
            rrf_score,
            lexical_rank: None,
            vector_rank: None,
            lexical_score: None,
            vector_score: None,
            chunk: Chunk {
                chunk_id: chunk_id.to_string(),
                text: "text".to_string(),
                product_id: product_id.to_string(),
                doc_type: DocType::Specification,
                page_number: 1,
                chunk_index: 0,
                source_file: "spec.pdf".to_string(),
                source_url: None,
                source_name: None,
            },
        }
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_minimum_per_product() {
        assert_eq!(min_per_product(1), 1);
        assert_eq!(min_per_product(5), 1);
        assert_eq!(min_per_product(6), 2);
    }

    #[test]
    fn test_underrepresented_product_swapped_in() {
        let ranked = vec![
            result("a1", "apple", 0.09),
            result("a2", "apple", 0.08),
            result("a3", "apple", 0.07),
            result("g1", "garmin", 0.06),
            result("a4", "apple", 0.05),
        ];

        let diverse = ensure_product_diversity(ranked, 3);
        assert_eq!(ids(&diverse), vec!["a1", "a2", "g1"]);
    }

    #[test]
    fn test_already_diverse_unchanged() {
        let ranked = vec![
            result("a1", "apple", 0.09),
            result("g1", "garmin", 0.08),
            result("a2", "apple", 0.07),
            result("g2", "garmin", 0.06),
        ];

        let diverse = ensure_product_diversity(ranked, 3);
        assert_eq!(ids(&diverse), vec!["a1", "g1", "a2"]);
    }

    #[test]
    fn test_fewer_candidates_than_top_k() {
        let ranked = vec![result("a1", "apple", 0.09), result("a2", "apple", 0.08)];
        assert_eq!(ids(&ensure_product_diversity(ranked, 5)), vec!["a1", "a2"]);
    }
}
