use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{ProdciteError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem before failing
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_lexical(config, &mut errors);
        Self::validate_vector(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_products(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProdciteError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;

        if chunking.chunk_target_tokens == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_target_tokens",
                "Target size must be greater than 0",
            ));
        }

        if chunking.chunk_overlap_tokens >= chunking.chunk_target_tokens {
            errors.push(ValidationError::new(
                "chunking.chunk_overlap_tokens",
                format!(
                    "Overlap ({}) must be smaller than the target size ({})",
                    chunking.chunk_overlap_tokens, chunking.chunk_target_tokens
                ),
            ));
        }

        if chunking.chunk_max_tokens < chunking.chunk_target_tokens {
            errors.push(ValidationError::new(
                "chunking.chunk_max_tokens",
                format!(
                    "Hard maximum ({}) cannot be below the target size ({})",
                    chunking.chunk_max_tokens, chunking.chunk_target_tokens
                ),
            ));
        }

        if let Some(path) = &chunking.tokenizer_file {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::new(
                    "chunking.tokenizer_file",
                    "Tokenizer file path cannot be empty",
                ));
            }
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.embedding_batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.max_concurrency == 0 {
            errors.push(ValidationError::new(
                "embedding.max_concurrency",
                "At least one batch must be allowed in flight",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_lexical(config: &Config, errors: &mut Vec<ValidationError>) {
        let k1 = config.lexical.bm25_k1;
        if !(k1.is_finite() && k1 > 0.0) {
            errors.push(ValidationError::new(
                "lexical.bm25_k1",
                format!("k1 must be a positive number, got {}", k1),
            ));
        }

        let b = config.lexical.bm25_b;
        if !(0.0..=1.0).contains(&b) {
            errors.push(ValidationError::new(
                "lexical.bm25_b",
                format!("b must be between 0.0 and 1.0, got {}", b),
            ));
        }
    }

    fn validate_vector(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.vector.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "vector.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.vector.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "vector.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.vector.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "vector.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.rrf_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                "RRF k must be greater than 0",
            ));
        }

        if retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }

        // Fusion needs more candidates than it returns to reorder anything
        if retrieval.branch_breadth <= retrieval.top_k {
            errors.push(ValidationError::new(
                "retrieval.branch_breadth",
                format!(
                    "Branch breadth ({}) must exceed top_k ({})",
                    retrieval.branch_breadth, retrieval.top_k
                ),
            ));
        }

        if retrieval.query_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "retrieval.query_timeout_ms",
                "Query timeout must be greater than 0",
            ));
        }
    }

    fn validate_products(config: &Config, errors: &mut Vec<ValidationError>) {
        for (product_id, product) in &config.products {
            let path = format!("products.{}.keywords", product_id);

            if product.keywords.is_empty() {
                errors.push(ValidationError::new(
                    path.clone(),
                    "At least one keyword is required",
                ));
            }

            for keyword in &product.keywords {
                if keyword.trim().is_empty() || *keyword != keyword.to_lowercase() {
                    errors.push(ValidationError::new(
                        path.clone(),
                        format!("Keywords must be non-empty lowercase, got '{}'", keyword),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProductConfig;

    fn failing_paths(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Err(ProdciteError::ConfigValidation { errors }) => {
                errors.into_iter().map(|e| e.path).collect()
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_breadth_must_exceed_top_k() {
        let mut config = Config::default();
        config.retrieval.branch_breadth = 5;
        config.retrieval.top_k = 5;
        assert_eq!(failing_paths(&config), vec!["retrieval.branch_breadth"]);
    }

    #[test]
    fn test_overlap_not_smaller_than_target() {
        let mut config = Config::default();
        config.chunking.chunk_overlap_tokens = 800;
        assert_eq!(failing_paths(&config), vec!["chunking.chunk_overlap_tokens"]);
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.lexical.bm25_b = 1.5;
        config.embedding.batch_size = 0;
        config.chunking.chunk_max_tokens = 10;

        let paths = failing_paths(&config);
        assert_eq!(paths.len(), 3);
        assert!(paths.contains(&"lexical.bm25_b".to_string()));
        assert!(paths.contains(&"embedding.embedding_batch_size".to_string()));
        assert!(paths.contains(&"chunking.chunk_max_tokens".to_string()));
    }

    #[test]
    fn test_uppercase_keyword_rejected() {
        let mut config = Config::default();
        config.products.insert(
            "apple_watch_series11_2025".to_string(),
            ProductConfig {
                keywords: vec!["Apple Watch".to_string()],
            },
        );
        assert_eq!(
            failing_paths(&config),
            vec!["products.apple_watch_series11_2025.keywords"]
        );
    }
}
