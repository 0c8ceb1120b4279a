/// Exact brute-force search
use super::{check_entries, check_query, rank, VectorEntry, VectorIndexError, VectorSearch};
use crate::config::VectorBackend;
use crate::filter::SearchFilter;
use tokio_util::sync::CancellationToken;

const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Dot product against every entry. Vectors are unit length, so the dot
/// product is the cosine similarity.
pub struct FlatIndex {
    entries: Vec<VectorEntry>,
    dimension: usize,
    generation_id: String,
}

impl FlatIndex {
    pub fn new(
        entries: Vec<VectorEntry>,
        dimension: usize,
        generation_id: impl Into<String>,
    ) -> Result<Self, VectorIndexError> {
        check_entries(&entries, dimension)?;
        Ok(Self {
            entries,
            dimension,
            generation_id: generation_id.into(),
        })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl VectorSearch for FlatIndex {
    fn search_cancellable(
        &self,
        query: &[f32],
        top_n: usize,
        filter: &SearchFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<(String, f32)>, VectorIndexError> {
        check_query(query, self.dimension)?;
        if top_n == 0 {
            return Ok(Vec::new());
        }

        let mut scored = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(VectorIndexError::Cancelled);
            }
            if !filter.matches(&entry.metadata) {
                continue;
            }
            scored.push((entry.chunk_id.clone(), dot(query, &entry.vector)));
        }

        rank(&mut scored);
        scored.truncate(top_n);
        Ok(scored)
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
        VectorBackend::Exact
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::test_support::{entry, unit};

    fn index() -> FlatIndex {
        FlatIndex::new(
            vec![
                entry("battery", "a", &[1.0, 0.1, 0.0]),
                entry("display", "a", &[0.0, 1.0, 0.0]),
                entry("strap", "b", &[0.0, 0.0, 1.0]),
                entry("battery_b", "b", &[0.9, 0.2, 0.0]),
            ],
            3,
            "gen-test",
        )
        .unwrap()
    }

    #[test]
    fn test_nearest_first() {
        let results = index()
            .search(&unit(&[1.0, 0.0, 0.0]), 2, &SearchFilter::none())
            .unwrap();
        assert_eq!(results[0].0, "battery");
        assert_eq!(results[1].0, "battery_b");
        assert!(results[0].1 <= 1.0 + 1e-6);
    }

    #[test]
    fn test_filter_by_product() {
        let results = index()
            .search(&unit(&[1.0, 0.0, 0.0]), 10, &SearchFilter::for_products(["b"]))
            .unwrap();
        let ids: Vec<_> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["battery_b", "strap"]);
    }

    #[test]
    fn test_ties_by_chunk_id() {
        let index = FlatIndex::new(
            vec![entry("b", "a", &[1.0, 0.0]), entry("a", "a", &[1.0, 0.0])],
            2,
            "gen-test",
        )
        .unwrap();
        let results = index.search(&[1.0, 0.0], 2, &SearchFilter::none()).unwrap();
        assert_eq!(results[0].0, "a");
        assert_eq!(results[1].0, "b");
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let result = index().search(&[1.0, 0.0], 2, &SearchFilter::none());
        assert!(matches!(
            result,
            Err(VectorIndexError::InvalidDimension { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = FlatIndex::new(
            vec![entry("x", "a", &[1.0, 0.0]), entry("x", "a", &[0.0, 1.0])],
            2,
            "gen-test",
        );
        assert!(matches!(result, Err(VectorIndexError::DuplicateId(_))));
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = index().search_cancellable(&unit(&[1.0, 0.0, 0.0]), 2, &SearchFilter::none(), &cancel);
        assert!(matches!(result, Err(VectorIndexError::Cancelled)));
    }
}
