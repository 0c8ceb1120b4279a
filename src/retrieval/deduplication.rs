//! Result deduplication by chunk ID

use crate::retrieval::SearchResult;
use std::collections::HashSet;

/// Deduplicate results by chunk_id, keeping the first (best-ranked) instance
pub fn deduplicate_results(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen: HashSet<String> = HashSet::new();

    results
        .into_iter()
        .filter(|result| seen.insert(result.chunk_id.clone()))
        .collect()
}
