//! Index generations: building, validating, persisting and swapping
//!
//! A generation is an immutable, self-consistent set of artifacts (chunk
//! table, lexical index, vector entries) stamped with one generation id.
//! Readers hold an `Arc` snapshot; publishing a new generation replaces the
//! pointer in one write and never disturbs queries already in flight.

mod builder;
mod chunk_table;
mod generation;
mod store;

pub use builder::IndexingPipeline;
pub use generation::{generation_id_for, GenerationHandle, GenerationManifest, IndexGeneration};
pub use store::{publish, IndexStore, StoredGeneration};

use crate::chunking::ChunkingError;
use crate::lexical::LexicalIndexError;
use crate::vector::VectorIndexError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Inconsistent generation {generation_id}: {reason}")]
    Consistency {
        generation_id: String,
        reason: String,
    },

    #[error("No index generation found in {0}")]
    NoGeneration(PathBuf),

    #[error("Nothing to index: no chunks were produced")]
    EmptyCorpus,

    #[error("Checksum mismatch for {artifact}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error("IO error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("Serialization error: {context}")]
    Json {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    #[error("Chunk table error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Indexing task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error(transparent)]
    Lexical(#[from] LexicalIndexError),

    #[error(transparent)]
    Vector(#[from] VectorIndexError),
}

impl IndexError {
    pub(crate) fn consistency(generation_id: &str, reason: impl Into<String>) -> Self {
        Self::Consistency {
            generation_id: generation_id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        Self::Io {
            source,
            context: context.into(),
        }
    }
}
