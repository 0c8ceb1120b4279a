//! Configuration management for prodcite
//!
//! Loads the TOML configuration, applies `PRODCITE_` environment overrides and
//! validates the result before any index is built or queried.

use crate::error::{ProdciteError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub lexical: LexicalConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Product id -> keywords users type to refer to it
    #[serde(default)]
    pub products: BTreeMap<String, ProductConfig>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Where index generations live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub index_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("~/.prodcite/index"),
        }
    }
}

/// Chunk sizing, measured in model tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_target_tokens: usize,
    pub chunk_overlap_tokens: usize,
    /// Hard ceiling; no chunk is ever larger
    pub chunk_max_tokens: usize,
    /// HuggingFace `tokenizer.json` used for counting. Falls back to the
    /// heuristic subword counter when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokenizer_file: Option<PathBuf>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_target_tokens: 800,
            chunk_overlap_tokens: 200,
            chunk_max_tokens: 1000,
            tokenizer_file: None,
        }
    }
}

/// Embedding model and batching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    #[serde(rename = "embedding_batch_size")]
    pub batch_size: usize,
    /// Batches in flight at once
    pub max_concurrency: usize,
    /// Attempts per item once its batch has failed
    pub max_retries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "paraphrase-multilingual-MiniLM-L12-v2".to_string(),
            batch_size: 32,
            max_concurrency: 4,
            max_retries: 2,
        }
    }
}

/// BM25 constants
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalConfig {
    pub bm25_k1: f32,
    pub bm25_b: f32,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            bm25_k1: 1.5,
            bm25_b: 0.75,
        }
    }
}

/// Which nearest-neighbour structure backs the vector side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Brute-force dot product
    Exact,
    /// Approximate HNSW graph
    Hnsw,
}

impl std::str::FromStr for VectorBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Self::Exact),
            "hnsw" => Ok(Self::Hnsw),
            other => Err(format!("unknown vector backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub backend: VectorBackend,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Exact,
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 64,
        }
    }
}

/// Query-time fusion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub rrf_k: u32,
    /// Candidates requested from each branch before fusion
    pub branch_breadth: usize,
    pub top_k: usize,
    pub query_timeout_ms: u64,
    /// Rebalance results so every candidate product is represented
    pub diversity: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            branch_breadth: 20,
            top_k: 5,
            query_timeout_ms: 2000,
            diversity: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductConfig {
    pub keywords: Vec<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ProdciteError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ProdciteError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ProdciteError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: PRODCITE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("PRODCITE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__INDEX_DIR" => self.storage.index_dir = PathBuf::from(value),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__EMBEDDING_BATCH_SIZE" => {
                self.embedding.batch_size = parse_env(path, value)?;
            }
            "CHUNKING__CHUNK_TARGET_TOKENS" => {
                self.chunking.chunk_target_tokens = parse_env(path, value)?;
            }
            "CHUNKING__CHUNK_OVERLAP_TOKENS" => {
                self.chunking.chunk_overlap_tokens = parse_env(path, value)?;
            }
            "VECTOR__BACKEND" => self.vector.backend = parse_env(path, value)?,
            "RETRIEVAL__RRF_K" => self.retrieval.rrf_k = parse_env(path, value)?,
            "RETRIEVAL__BRANCH_BREADTH" => {
                self.retrieval.branch_breadth = parse_env(path, value)?;
            }
            "RETRIEVAL__TOP_K" => self.retrieval.top_k = parse_env(path, value)?,
            "RETRIEVAL__QUERY_TIMEOUT_MS" => {
                self.retrieval.query_timeout_ms = parse_env(path, value)?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Index directory with a leading `~/` expanded
    pub fn index_dir(&self) -> Result<PathBuf> {
        expand_path(&self.storage.index_dir)
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            ProdciteError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("prodcite").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            lexical: LexicalConfig::default(),
            vector: VectorConfig::default(),
            retrieval: RetrievalConfig::default(),
            products: BTreeMap::new(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| ProdciteError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ProdciteError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            ProdciteError::Config("Cannot determine home directory".to_string())
        })?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.chunking.chunk_target_tokens, 800);
        assert_eq!(config.chunking.chunk_overlap_tokens, 200);
        assert_eq!(config.retrieval.rrf_k, 60);
        assert_eq!(config.retrieval.branch_breadth, 20);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.lexical.bm25_k1, 1.5);
        assert_eq!(config.lexical.bm25_b, 0.75);
        assert_eq!(config.vector.backend, VectorBackend::Exact);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.retrieval.top_k = 7;
        config.products.insert(
            "garmin_forerunner_970_2025".to_string(),
            ProductConfig {
                keywords: vec!["garmin".to_string(), "forerunner 970".to_string()],
            },
        );
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.retrieval.top_k, 7);
        assert_eq!(
            loaded.products["garmin_forerunner_970_2025"].keywords,
            vec!["garmin", "forerunner 970"]
        );
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[_meta]\nschema_version = \"1.0.0\"\n\n[retrieval]\ntop_k = 3\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.branch_breadth, 20);
        assert_eq!(config.chunking.chunk_target_tokens, 800);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ProdciteError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("hnsw".parse::<VectorBackend>(), Ok(VectorBackend::Hnsw));
        assert!("annoy".parse::<VectorBackend>().is_err());
    }
}
