use super::IndexError;
use crate::chunking::Chunk;
use crate::lexical::{Bm25Params, LexicalIndex};
use crate::vector::VectorSearch;
use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info};

/// Everything needed to identify and check a generation without loading it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationManifest {
    pub generation_id: String,
    pub created_at: DateTime<Utc>,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub document_count: usize,
    pub chunk_count: usize,
    pub lexical_count: usize,
    pub vector_count: usize,
    /// Chunks that could not be embedded; lexical-only
    pub excluded_chunk_ids: Vec<String>,
    pub bm25: Bm25Params,
    /// Artifact file name -> BLAKE3 hex digest, filled in when persisted
    #[serde(default)]
    pub checksums: BTreeMap<String, String>,
}

/// `gen-<UTC timestamp>-<12 hex of BLAKE3 over chunk ids and texts>`
pub fn generation_id_for(chunks: &[Chunk], created_at: DateTime<Utc>) -> String {
    let mut hasher = blake3::Hasher::new();
    for chunk in chunks {
        hasher.update(chunk.chunk_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(chunk.text.as_bytes());
        hasher.update(&[0]);
    }
    let digest = hasher.finalize().to_hex();

    format!(
        "gen-{}-{}",
        created_at.format("%Y%m%dT%H%M%SZ"),
        &digest.as_str()[..12]
    )
}

/// One loaded, immutable index generation
pub struct IndexGeneration {
    manifest: GenerationManifest,
    chunks: Vec<Chunk>,
    positions: AHashMap<String, usize>,
    lexical: LexicalIndex,
    vector: Box<dyn VectorSearch>,
}

impl IndexGeneration {
    pub fn new(
        manifest: GenerationManifest,
        chunks: Vec<Chunk>,
        lexical: LexicalIndex,
        vector: Box<dyn VectorSearch>,
    ) -> Self {
        let positions = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.chunk_id.clone(), i))
            .collect();

        Self {
            manifest,
            chunks,
            positions,
            lexical,
            vector,
        }
    }

    pub fn manifest(&self) -> &GenerationManifest {
        &self.manifest
    }

    pub(crate) fn manifest_mut(&mut self) -> &mut GenerationManifest {
        &mut self.manifest
    }

    pub fn generation_id(&self) -> &str {
        &self.manifest.generation_id
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, chunk_id: &str) -> Option<&Chunk> {
        self.positions.get(chunk_id).map(|&i| &self.chunks[i])
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn vector(&self) -> &dyn VectorSearch {
        self.vector.as_ref()
    }

    /// Check that every artifact describes the same chunk set
    pub fn validate(&self) -> Result<(), IndexError> {
        let id = self.generation_id();
        let fail = |reason: String| -> Result<(), IndexError> {
            Err(IndexError::consistency(id, reason))
        };

        if self.chunks.is_empty() {
            return fail("generation has no chunks".to_string());
        }
        if self.positions.len() != self.chunks.len() {
            return fail("duplicate chunk ids in chunk table".to_string());
        }

        if self.lexical.generation_id() != id {
            return fail(format!(
                "lexical index stamped {}",
                self.lexical.generation_id()
            ));
        }
        if self.vector.generation_id() != id {
            return fail(format!(
                "vector index stamped {}",
                self.vector.generation_id()
            ));
        }

        if self.lexical.len() != self.chunks.len() {
            return fail(format!(
                "lexical index has {} documents for {} chunks",
                self.lexical.len(),
                self.chunks.len()
            ));
        }
        if let Some(stray) = self.lexical.chunk_ids().iter().find(|c| !self.positions.contains_key(*c)) {
            return fail(format!("lexical index references unknown chunk {}", stray));
        }
        self.lexical.check_integrity()?;

        let excluded = &self.manifest.excluded_chunk_ids;
        if self.vector.len() + excluded.len() != self.chunks.len() {
            return fail(format!(
                "{} vectors + {} excluded does not cover {} chunks",
                self.vector.len(),
                excluded.len(),
                self.chunks.len()
            ));
        }

        let mut covered: AHashSet<&str> = AHashSet::with_capacity(self.chunks.len());
        for chunk_id in self
            .vector
            .entries()
            .iter()
            .map(|e| e.chunk_id.as_str())
            .chain(excluded.iter().map(String::as_str))
        {
            if !self.positions.contains_key(chunk_id) {
                return fail(format!("vector side references unknown chunk {}", chunk_id));
            }
            if !covered.insert(chunk_id) {
                return fail(format!("chunk {} is both embedded and excluded", chunk_id));
            }
        }

        if self.vector.dimension() != self.manifest.embedding_dimension {
            return fail(format!(
                "vector dimension {} but manifest says {}",
                self.vector.dimension(),
                self.manifest.embedding_dimension
            ));
        }

        let counts = (
            self.manifest.chunk_count,
            self.manifest.lexical_count,
            self.manifest.vector_count,
        );
        if counts != (self.chunks.len(), self.lexical.len(), self.vector.len()) {
            return fail(format!("manifest counts {:?} do not match artifacts", counts));
        }

        Ok(())
    }
}

/// Shared pointer to the live generation
///
/// Cloning the handle shares the same slot. Readers take an `Arc` snapshot
/// and keep it for the whole query, so a swap never changes results midway.
#[derive(Clone, Default)]
pub struct GenerationHandle {
    slot: Arc<RwLock<Option<Arc<IndexGeneration>>>>,
}

impl GenerationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<IndexGeneration>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate `generation` and make it live, returning the one it replaced.
    /// On validation failure the current generation stays live.
    pub fn swap(&self, generation: IndexGeneration) -> Result<Option<Arc<IndexGeneration>>, IndexError> {
        if let Err(e) = generation.validate() {
            error!("Refusing to activate generation: {}", e);
            return Err(e);
        }

        let generation = Arc::new(generation);
        let previous = self
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(generation.clone());

        info!(
            "Activated generation {} ({} chunks, {} vectors){}",
            generation.generation_id(),
            generation.manifest().chunk_count,
            generation.manifest().vector_count,
            previous
                .as_ref()
                .map(|p| format!(", replacing {}", p.generation_id()))
                .unwrap_or_default()
        );

        Ok(previous)
    }
}
