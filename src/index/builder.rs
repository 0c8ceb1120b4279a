use super::generation::{generation_id_for, GenerationManifest, IndexGeneration};
use super::IndexError;
use crate::chunking::{Chunk, Chunker};
use crate::config::{Config, VectorConfig};
use crate::embedding::{EmbeddingGenerator, EmbeddingProvider};
use crate::ingest::Document;
use crate::lexical::{Bm25Params, LexicalIndex};
use crate::vector::{build_vector_index, VectorEntry};
use ahash::AHashMap;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Offline pipeline: documents in, validated generation out
pub struct IndexingPipeline {
    chunker: Chunker,
    embedder: EmbeddingGenerator,
    bm25: Bm25Params,
    vector_config: VectorConfig,
}

impl IndexingPipeline {
    pub fn new(
        chunker: Chunker,
        embedder: EmbeddingGenerator,
        bm25: Bm25Params,
        vector_config: VectorConfig,
    ) -> Self {
        Self {
            chunker,
            embedder,
            bm25,
            vector_config,
        }
    }

    pub fn from_config(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self, IndexError> {
        Ok(Self::new(
            Chunker::from_config(&config.chunking)?,
            EmbeddingGenerator::new(provider, &config.embedding),
            Bm25Params::from(&config.lexical),
            config.vector.clone(),
        ))
    }

    /// Chunk, embed, build both indexes concurrently, then validate
    pub async fn run(&self, documents: &[Document]) -> Result<IndexGeneration, IndexError> {
        let started = std::time::Instant::now();

        let chunks = self.chunker.chunk_documents(documents).await?;
        if chunks.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }
        info!("Chunked {} documents into {} chunks", documents.len(), chunks.len());

        let created_at = Utc::now();
        let generation_id = generation_id_for(&chunks, created_at);

        let report = self.embedder.embed_chunks(&chunks).await;
        let excluded = report.failed_ids();

        let metadata: AHashMap<&str, &Chunk> = chunks.iter().map(|c| (c.chunk_id.as_str(), c)).collect();
        let entries: Vec<VectorEntry> = report
            .embedded
            .into_iter()
            .filter_map(|(chunk_id, vector)| {
                let chunk = metadata.get(chunk_id.as_str())?;
                Some(VectorEntry {
                    metadata: chunk.metadata(),
                    chunk_id,
                    vector,
                })
            })
            .collect();

        let provider = self.embedder.provider();
        let dimension = provider.dimension();
        let embedding_model = provider.model_name().to_string();

        let chunks = Arc::new(chunks);
        let lexical_task = {
            let chunks = chunks.clone();
            let bm25 = self.bm25;
            let generation_id = generation_id.clone();
            tokio::task::spawn_blocking(move || LexicalIndex::build(&chunks, bm25, generation_id))
        };
        let vector_task = {
            let config = self.vector_config.clone();
            let generation_id = generation_id.clone();
            tokio::task::spawn_blocking(move || build_vector_index(entries, dimension, generation_id, &config))
        };

        let (lexical, vector) = tokio::join!(lexical_task, vector_task);
        let lexical = lexical.map_err(|e| IndexError::Task(e.to_string()))?;
        let vector = vector.map_err(|e| IndexError::Task(e.to_string()))??;

        let chunks = Arc::try_unwrap(chunks).unwrap_or_else(|shared| shared.as_ref().clone());

        let manifest = GenerationManifest {
            generation_id,
            created_at,
            embedding_model,
            embedding_dimension: dimension,
            document_count: documents.len(),
            chunk_count: chunks.len(),
            lexical_count: lexical.len(),
            vector_count: vector.len(),
            excluded_chunk_ids: excluded,
            bm25: self.bm25,
            checksums: BTreeMap::new(),
        };

        let generation = IndexGeneration::new(manifest, chunks, lexical, vector);
        generation.validate()?;

        info!(
            "Built generation {} in {}ms: {} chunks, {} vectors, {} excluded, {} terms",
            generation.generation_id(),
            started.elapsed().as_millis(),
            generation.manifest().chunk_count,
            generation.manifest().vector_count,
            generation.manifest().excluded_chunk_ids.len(),
            generation.lexical().term_count()
        );

        Ok(generation)
    }
}
