//! Hybrid search combining the lexical and vector branches

use super::diversity::ensure_product_diversity;
use super::{
    deduplicate_results, reciprocal_rank_fusion, Branch, RetrievalError, SearchRequest,
    SearchResponse, SearchResult,
};
use crate::config::RetrievalConfig;
use crate::embedding::{l2_normalize, EmbeddingProvider};
use crate::index::{GenerationHandle, GenerationManifest, IndexGeneration};
use crate::lexical::tokenize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::error::Elapsed;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type BranchHits = Result<Vec<(String, f32)>, String>;

/// Answers queries against whichever generation is current when they arrive
pub struct HybridRetriever {
    generations: GenerationHandle,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        generations: GenerationHandle,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        if config.rrf_k == 0 {
            return Err(RetrievalError::Config("rrf_k must be positive".to_string()));
        }
        if config.query_timeout_ms == 0 {
            return Err(RetrievalError::Config(
                "query_timeout_ms must be positive".to_string(),
            ));
        }

        Ok(Self {
            generations,
            embedding_provider,
            config,
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Top `top_k` results for `query` with no filter
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>, RetrievalError> {
        let request = SearchRequest::new(query, top_k);
        let response = self.search_with(&request, &CancellationToken::new()).await?;
        Ok(response.results)
    }

    /// Run both branches concurrently under one deadline, then fuse
    pub async fn search_with(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, RetrievalError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(RetrievalError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }
        if request.top_k == 0 {
            return Err(RetrievalError::InvalidQuery(
                "top_k must be positive".to_string(),
            ));
        }

        let generation = self.generations.current().ok_or_else(|| {
            RetrievalError::Unavailable("no index generation is loaded".to_string())
        })?;
        self.check_model(generation.manifest())?;

        if cancel.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }

        let started = std::time::Instant::now();
        let deadline = Instant::now() + Duration::from_millis(self.config.query_timeout_ms);
        let breadth = self.config.branch_breadth.max(request.top_k);
        let branch_cancel = cancel.child_token();

        let lexical_task = {
            let generation = generation.clone();
            let tokens = tokenize(query);
            let filter = request.filter.clone();
            let token = branch_cancel.clone();
            tokio::task::spawn_blocking(move || -> BranchHits {
                generation
                    .lexical()
                    .search_cancellable(&tokens, breadth, &filter, &token)
                    .map_err(|e| e.to_string())
            })
        };

        let vector_task = {
            let generation = generation.clone();
            let provider = self.embedding_provider.clone();
            let query = query.to_string();
            let filter = request.filter.clone();
            let token = branch_cancel.clone();
            tokio::task::spawn_blocking(move || -> BranchHits {
                let embedding = provider.embed(&query).map_err(|e| e.to_string())?;
                let embedding = l2_normalize(embedding).map_err(|e| e.to_string())?;
                generation
                    .vector()
                    .search_cancellable(&embedding, breadth, &filter, &token)
                    .map_err(|e| e.to_string())
            })
        };

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                branch_cancel.cancel();
                return Err(RetrievalError::Cancelled);
            }
            joined = async move {
                tokio::join!(
                    timeout_at(deadline, lexical_task),
                    timeout_at(deadline, vector_task)
                )
            } => joined,
        };

        // Stops a branch still running past the deadline
        branch_cancel.cancel();

        let lexical = settle(Branch::Lexical, joined.0);
        let vector = settle(Branch::Vector, joined.1);

        let (lexical, vector, degraded) = match (lexical, vector) {
            (Some(lexical), Some(vector)) => (lexical, vector, None),
            (Some(lexical), None) => (lexical, Vec::new(), Some(Branch::Vector)),
            (None, Some(vector)) => (Vec::new(), vector, Some(Branch::Lexical)),
            (None, None) => {
                return Err(RetrievalError::Unavailable(
                    "both retrieval branches failed".to_string(),
                ));
            }
        };

        if let Some(branch) = degraded {
            warn!(
                "Serving degraded results for '{}': {} branch unavailable",
                query, branch
            );
        }

        debug!(
            "Branches returned {} lexical and {} vector candidates",
            lexical.len(),
            vector.len()
        );

        let fused = reciprocal_rank_fusion(&lexical, &vector, self.config.rrf_k);
        let results = deduplicate_results(hydrate(&generation, fused));

        let diversity = request.diversity.unwrap_or(self.config.diversity);
        let results = if diversity {
            ensure_product_diversity(results, request.top_k)
        } else {
            let mut results = results;
            results.truncate(request.top_k);
            results
        };

        debug!(
            "Search for '{}' returned {} results in {}ms",
            query,
            results.len(),
            started.elapsed().as_millis()
        );

        Ok(SearchResponse {
            generation_id: generation.generation_id().to_string(),
            results,
            degraded,
        })
    }

    fn check_model(&self, manifest: &GenerationManifest) -> Result<(), RetrievalError> {
        let provider_model = self.embedding_provider.model_name();
        let provider_dimension = self.embedding_provider.dimension();

        if manifest.embedding_model != provider_model
            || manifest.embedding_dimension != provider_dimension
        {
            return Err(RetrievalError::ModelMismatch {
                index_model: manifest.embedding_model.clone(),
                index_dimension: manifest.embedding_dimension,
                provider_model: provider_model.to_string(),
                provider_dimension,
            });
        }
        Ok(())
    }
}

fn settle(branch: Branch, outcome: Result<Result<BranchHits, JoinError>, Elapsed>) -> Option<Vec<(String, f32)>> {
    match outcome {
        Ok(Ok(Ok(hits))) => Some(hits),
        Ok(Ok(Err(e))) => {
            warn!("{} branch failed: {}", branch, e);
            None
        }
        Ok(Err(e)) => {
            warn!("{} branch task failed: {}", branch, e);
            None
        }
        Err(_) => {
            warn!("{} branch missed the query deadline", branch);
            None
        }
    }
}

/// Attach chunks; ids the generation does not know are dropped
fn hydrate(generation: &IndexGeneration, fused: Vec<super::FusedCandidate>) -> Vec<SearchResult> {
    fused
        .into_iter()
        .filter_map(|candidate| match generation.chunk(&candidate.chunk_id) {
            Some(chunk) => Some(SearchResult::from_candidate(candidate, chunk.clone())),
            None => {
                warn!("Fused chunk {} missing from generation", candidate.chunk_id);
                None
            }
        })
        .collect()
}
