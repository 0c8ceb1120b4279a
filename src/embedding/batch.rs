/// Batched, bounded-concurrency embedding of chunks
use super::{EmbeddingError, EmbeddingProvider};
use crate::chunking::Chunk;
use crate::config::EmbeddingConfig;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

const NORM_EPSILON: f32 = 1e-12;

/// A chunk that could not be embedded
#[derive(Debug, Clone)]
pub struct EmbeddingFailure {
    pub chunk_id: String,
    pub reason: String,
}

/// Result of embedding a set of chunks
#[derive(Debug, Default)]
pub struct EmbeddingReport {
    /// `(chunk_id, unit vector)` in input order, failed chunks omitted
    pub embedded: Vec<(String, Vec<f32>)>,
    pub failed: Vec<EmbeddingFailure>,
    pub duration_ms: u64,
}

impl EmbeddingReport {
    pub fn failed_ids(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.chunk_id.clone()).collect()
    }
}

/// Scale a vector to unit length; zero or non-finite vectors are rejected
pub fn l2_normalize(mut vector: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(EmbeddingError::Degenerate);
    }

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm < NORM_EPSILON {
        return Err(EmbeddingError::Degenerate);
    }

    for x in &mut vector {
        *x /= norm;
    }
    Ok(vector)
}

/// Per-item outcome of one batch
type BatchOutcome = Vec<Result<Vec<f32>, String>>;

/// Embeds chunk texts in batches on the blocking pool
///
/// At most `max_concurrency` batches are in flight. A failed batch is
/// retried item by item so one bad chunk costs only itself.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    max_concurrency: usize,
    max_retries: usize,
}

impl EmbeddingGenerator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            batch_size: config.batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
            max_retries: config.max_retries.max(1),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Embed every chunk; failures are isolated and reported, never fatal
    pub async fn embed_chunks(&self, chunks: &[Chunk]) -> EmbeddingReport {
        let start = std::time::Instant::now();
        info!(
            "Embedding {} chunks with {} (batch size {}, {} in flight)",
            chunks.len(),
            self.provider.model_name(),
            self.batch_size,
            self.max_concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = Vec::new();

        for (batch_index, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let generator = self.clone();
            let semaphore = semaphore.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return vec![Err(e.to_string()); texts.len()],
                };
                generator.embed_batch_isolated(batch_index, texts).await
            }));
        }

        let mut report = EmbeddingReport::default();
        for (task, batch) in tasks.into_iter().zip(chunks.chunks(self.batch_size)) {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => vec![Err(format!("embedding task failed: {}", e)); batch.len()],
            };

            for (chunk, result) in batch.iter().zip(outcome) {
                match result {
                    Ok(vector) => report.embedded.push((chunk.chunk_id.clone(), vector)),
                    Err(reason) => {
                        warn!(
                            "Excluding chunk {} from the vector index: {}",
                            chunk.chunk_id, reason
                        );
                        report.failed.push(EmbeddingFailure {
                            chunk_id: chunk.chunk_id.clone(),
                            reason,
                        });
                    }
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Embedding complete: {} embedded, {} failed, {}ms",
            report.embedded.len(),
            report.failed.len(),
            report.duration_ms
        );

        report
    }

    /// Embed one query text as a unit vector
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        let provider = self.provider.clone();
        let query = query.to_string();
        let vector = tokio::task::spawn_blocking(move || provider.embed(&query))
            .await
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))??;
        l2_normalize(vector)
    }

    async fn embed_batch_isolated(&self, batch_index: usize, texts: Vec<String>) -> BatchOutcome {
        let expected = texts.len();
        let provider = self.provider.clone();
        let batch_texts = texts.clone();

        let whole = tokio::task::spawn_blocking(move || provider.embed_batch(&batch_texts))
            .await
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))
            .and_then(|result| result)
            .and_then(|vectors| {
                if vectors.len() == expected {
                    Ok(vectors)
                } else {
                    Err(EmbeddingError::GenerationError(format!(
                        "Embedding count mismatch: expected {}, got {}",
                        expected,
                        vectors.len()
                    )))
                }
            });

        match whole {
            Ok(vectors) => {
                debug!("Embedded batch {} ({} items)", batch_index, expected);
                let mut outcome = Vec::with_capacity(expected);
                for (text, vector) in texts.iter().zip(vectors) {
                    match l2_normalize(vector) {
                        Ok(unit) => outcome.push(Ok(unit)),
                        // A degenerate item inside a good batch still gets its retries
                        Err(_) => outcome.push(self.embed_single(text.clone()).await),
                    }
                }
                outcome
            }
            Err(e) => {
                warn!(
                    "Batch {} failed ({}); retrying its {} items individually",
                    batch_index, e, expected
                );
                let mut outcome = Vec::with_capacity(expected);
                for text in texts {
                    outcome.push(self.embed_single(text).await);
                }
                outcome
            }
        }
    }

    async fn embed_single(&self, text: String) -> Result<Vec<f32>, String> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            let provider = self.provider.clone();
            let input = text.clone();
            let result = tokio::task::spawn_blocking(move || provider.embed(&input))
                .await
                .map_err(|e| EmbeddingError::GenerationError(e.to_string()))
                .and_then(|result| result)
                .and_then(l2_normalize);

            match result {
                Ok(vector) => return Ok(vector),
                Err(e) => {
                    debug!("Attempt {}/{} failed: {}", attempt, self.max_retries, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::ingest::DocType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            text: text.to_string(),
            product_id: "p".to_string(),
            doc_type: DocType::Manual,
            page_number: 1,
            chunk_index: 0,
            source_file: "manual.pdf".to_string(),
            source_url: None,
            source_name: None,
        }
    }

    fn config(batch_size: usize, max_retries: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            batch_size,
            max_retries,
            ..EmbeddingConfig::default()
        }
    }

    /// Fails any batch of more than one text and any text containing "poison"
    struct FlakyProvider {
        inner: HashEmbedder,
        calls: AtomicUsize,
    }

    impl EmbeddingProvider for FlakyProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("poison") {
                return Err(EmbeddingError::GenerationError("poisoned".to_string()));
            }
            self.inner.embed(text)
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.len() > 1 {
                return Err(EmbeddingError::GenerationError("batch rejected".to_string()));
            }
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    #[test]
    fn test_normalize() {
        let unit = l2_normalize(vec![3.0, 4.0]).unwrap();
        assert!((unit[0] - 0.6).abs() < 1e-6);
        assert!((unit[1] - 0.8).abs() < 1e-6);

        assert!(matches!(l2_normalize(vec![0.0, 0.0]), Err(EmbeddingError::Degenerate)));
        assert!(matches!(l2_normalize(vec![f32::NAN, 1.0]), Err(EmbeddingError::Degenerate)));
    }

    #[tokio::test]
    async fn test_output_order_and_unit_norm() {
        let chunks: Vec<Chunk> = (0..10)
            .map(|i| chunk(&format!("c{}", i), &format!("chunk number {} about batteries", i)))
            .collect();

        let generator = EmbeddingGenerator::new(Arc::new(HashEmbedder::new(64)), &config(3, 2));
        let report = generator.embed_chunks(&chunks).await;

        assert!(report.failed.is_empty());
        let ids: Vec<_> = report.embedded.iter().map(|(id, _)| id.clone()).collect();
        let expected: Vec<_> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
        assert_eq!(ids, expected);

        for (_, vector) in &report.embedded {
            let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn test_batch_size_does_not_change_vectors() {
        let chunks: Vec<Chunk> = (0..7)
            .map(|i| chunk(&format!("c{}", i), &format!("heart rate sensor reading {}", i)))
            .collect();

        let small = EmbeddingGenerator::new(Arc::new(HashEmbedder::new(64)), &config(1, 2))
            .embed_chunks(&chunks)
            .await;
        let large = EmbeddingGenerator::new(Arc::new(HashEmbedder::new(64)), &config(32, 2))
            .embed_chunks(&chunks)
            .await;

        assert_eq!(small.embedded, large.embedded);
    }

    #[tokio::test]
    async fn test_failed_batch_retried_per_item() {
        let chunks = vec![
            chunk("good_1", "water resistance rating"),
            chunk("bad", "poison text"),
            chunk("good_2", "sapphire display glass"),
        ];

        let provider = Arc::new(FlakyProvider {
            inner: HashEmbedder::new(32),
            calls: AtomicUsize::new(0),
        });
        let generator = EmbeddingGenerator::new(provider.clone(), &config(8, 2));
        let report = generator.embed_chunks(&chunks).await;

        let ids: Vec<_> = report.embedded.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["good_1", "good_2"]);
        assert_eq!(report.failed_ids(), vec!["bad".to_string()]);
        // two good items once each, the bad item twice
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_embed_query_is_normalized() {
        let generator = EmbeddingGenerator::new(Arc::new(HashEmbedder::new(64)), &config(4, 1));
        let vector = generator.embed_query("battery life").await.unwrap();
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
