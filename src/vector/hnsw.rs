/// Approximate search with an HNSW graph
use super::{check_entries, check_query, rank, VectorEntry, VectorIndexError, VectorSearch};
use crate::config::{VectorBackend, VectorConfig};
use crate::filter::SearchFilter;
use hnsw_rs::prelude::*;
use tokio_util::sync::CancellationToken;

const MAX_LAYERS: usize = 16;

/// Filtered searches start by fetching this many candidates per result
const FILTER_OVERFETCH: usize = 4;

/// HNSW over cosine distance. Graph ids are positions in `entries`.
pub struct HnswIndex {
    graph: Hnsw<'static, f32, DistCosine>,
    entries: Vec<VectorEntry>,
    dimension: usize,
    ef_search: usize,
    generation_id: String,
}

impl HnswIndex {
    pub fn new(
        entries: Vec<VectorEntry>,
        dimension: usize,
        generation_id: impl Into<String>,
        config: &VectorConfig,
    ) -> Result<Self, VectorIndexError> {
        check_entries(&entries, dimension)?;

        let graph = Hnsw::<f32, DistCosine>::new(
            config.hnsw_m,
            entries.len().max(1),
            MAX_LAYERS,
            config.hnsw_ef_construction,
            DistCosine,
        );

        for (id, entry) in entries.iter().enumerate() {
            graph.insert((entry.vector.as_slice(), id));
        }

        tracing::debug!(
            "Built HNSW graph over {} vectors (M={}, ef_construction={})",
            entries.len(),
            config.hnsw_m,
            config.hnsw_ef_construction
        );

        Ok(Self {
            graph,
            entries,
            dimension,
            ef_search: config.hnsw_ef_search,
            generation_id: generation_id.into(),
        })
    }

    fn neighbours(&self, query: &[f32], k: usize, filter: &SearchFilter) -> Vec<(String, f32)> {
        self.graph
            .search(query, k, self.ef_search.max(k))
            .into_iter()
            .filter_map(|neighbour| self.entries.get(neighbour.d_id).map(|e| (e, neighbour.distance)))
            .filter(|(entry, _)| filter.matches(&entry.metadata))
            .map(|(entry, distance)| (entry.chunk_id.clone(), 1.0 - distance))
            .collect()
    }
}

impl VectorSearch for HnswIndex {
    fn search_cancellable(
        &self,
        query: &[f32],
        top_n: usize,
        filter: &SearchFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<(String, f32)>, VectorIndexError> {
        check_query(query, self.dimension)?;
        if top_n == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let total = self.entries.len();
        let mut k = if filter.is_empty() {
            top_n.min(total)
        } else {
            (top_n * FILTER_OVERFETCH).min(total)
        };

        // Widen the candidate pool until enough survive the filter
        let mut results = loop {
            if cancel.is_cancelled() {
                return Err(VectorIndexError::Cancelled);
            }

            let found = self.neighbours(query, k, filter);
            if found.len() >= top_n || k >= total {
                break found;
            }
            k = (k * 2).min(total);
        };

        rank(&mut results);
        results.truncate(top_n);
        Ok(results)
    }

    fn entries(&self) -> &[VectorEntry] {
        &self.entries
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn generation_id(&self) -> &str {
        &self.generation_id
    }

    fn backend(&self) -> VectorBackend {
        VectorBackend::Hnsw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::test_support::{entry, unit};
    use crate::vector::FlatIndex;

    fn entries() -> Vec<VectorEntry> {
        (0..40)
            .map(|i| {
                let angle = i as f32 * 0.07;
                let product = if i % 2 == 0 { "even" } else { "odd" };
                entry(&format!("c{:02}", i), product, &[angle.cos(), angle.sin(), 0.1])
            })
            .collect()
    }

    #[test]
    fn test_agrees_with_exact_search_on_small_set() {
        let config = VectorConfig::default();
        let hnsw = HnswIndex::new(entries(), 3, "gen-test", &config).unwrap();
        let flat = FlatIndex::new(entries(), 3, "gen-test").unwrap();

        let query = unit(&[1.0, 0.05, 0.1]);
        let approx = hnsw.search(&query, 3, &SearchFilter::none()).unwrap();
        let exact = flat.search(&query, 3, &SearchFilter::none()).unwrap();

        assert_eq!(approx[0].0, exact[0].0);
        assert!((approx[0].1 - exact[0].1).abs() < 1e-4);
    }

    #[test]
    fn test_filtered_search_overfetches() {
        let hnsw = HnswIndex::new(entries(), 3, "gen-test", &VectorConfig::default()).unwrap();
        let results = hnsw
            .search(&unit(&[1.0, 0.0, 0.1]), 5, &SearchFilter::for_products(["odd"]))
            .unwrap();

        assert_eq!(results.len(), 5);
        let odd_ids: Vec<String> = (0..40)
            .filter(|i| i % 2 == 1)
            .map(|i| format!("c{:02}", i))
            .collect();
        assert!(results.iter().all(|(id, _)| odd_ids.contains(id)));
    }

    #[test]
    fn test_empty_index() {
        let hnsw = HnswIndex::new(Vec::new(), 3, "gen-test", &VectorConfig::default()).unwrap();
        assert!(hnsw.is_empty());
        assert!(hnsw.search(&[1.0, 0.0, 0.0], 5, &SearchFilter::none()).unwrap().is_empty());
    }
}
