/// Embedding provider trait with FastEmbed and feature-hashing implementations
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Degenerate embedding (zero or non-finite vector)")]
    Degenerate,
}

/// Trait for embedding providers
///
/// Calls are synchronous and CPU-bound; async callers run them on the
/// blocking pool.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, one per input in input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Models known to work with product documents in several languages
struct ModelSpec {
    name: &'static str,
    model: EmbeddingModel,
    dimension: usize,
    size_mb: usize,
}

const SUPPORTED_MODELS: [ModelSpec; 5] = [
    ModelSpec {
        name: "paraphrase-multilingual-MiniLM-L12-v2",
        model: EmbeddingModel::ParaphraseMLMiniLML12V2,
        dimension: 384,
        size_mb: 470,
    },
    ModelSpec {
        name: "multilingual-e5-small",
        model: EmbeddingModel::MultilingualE5Small,
        dimension: 384,
        size_mb: 470,
    },
    ModelSpec {
        name: "all-MiniLM-L6-v2",
        model: EmbeddingModel::AllMiniLML6V2,
        dimension: 384,
        size_mb: 90,
    },
    ModelSpec {
        name: "bge-small-en-v1.5",
        model: EmbeddingModel::BGESmallENV15,
        dimension: 384,
        size_mb: 130,
    },
    ModelSpec {
        name: "bge-base-en-v1.5",
        model: EmbeddingModel::BGEBaseENV15,
        dimension: 768,
        size_mb: 440,
    },
];

pub const DEFAULT_MODEL: &str = "paraphrase-multilingual-MiniLM-L12-v2";

/// FastEmbed provider for local embedding generation
///
/// **Important**: Models are downloaded on first use to the fastembed cache
/// directory. The default multilingual model is roughly 470MB.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let spec = SUPPORTED_MODELS
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(model_name))
            .ok_or_else(|| {
                let names: Vec<&str> = SUPPORTED_MODELS.iter().map(|s| s.name).collect();
                EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: {}",
                    model_name,
                    names.join(", ")
                ))
            })?;

        tracing::info!(
            "Initializing embedding model: {} ({}D, ~{}MB download if not cached)",
            spec.name,
            spec.dimension,
            spec.size_mb
        );

        let init_options = InitOptions::new(spec.model.clone()).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: spec.name.to_string(),
            dimension: spec.dimension,
        })
    }

    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new(DEFAULT_MODEL)
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut embeddings = self.embed_batch(&[text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Deterministic feature-hashing embedder
///
/// Every lowercase token and adjacent token pair is hashed with BLAKE3 into
/// one signed bucket. Texts sharing vocabulary end up close; there is no
/// notion of synonymy. Needs no model download.
pub struct HashEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashEmbedder {
    pub const PREFIX: &'static str = "hash-";

    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_name: format!("{}{}", Self::PREFIX, dimension),
        }
    }

    /// Parse a `hash-<dim>` model name
    pub fn from_model_name(name: &str) -> Option<Self> {
        name.strip_prefix(Self::PREFIX)?
            .parse::<usize>()
            .ok()
            .filter(|&dim| dim > 0)
            .map(Self::new)
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = blake3::hash(feature.as_bytes());
        let bytes = hash.as_bytes();
        let bucket = u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]);
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[(bucket % self.dimension as u64) as usize] += sign * weight;
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let tokens = crate::lexical::tokenize(text);
        if tokens.is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "Text has no indexable tokens".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Provider named by `embedding.model`: `hash-<dim>` or a FastEmbed model
pub fn provider_for_model(model_name: &str) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match HashEmbedder::from_model_name(model_name) {
        Some(hasher) => Ok(Arc::new(hasher)),
        None => Ok(Arc::new(FastEmbedProvider::new(model_name)?)),
    }
}
