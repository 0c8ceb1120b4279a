//! On-disk generations with an atomically replaced `CURRENT` pointer
//!
//! Layout:
//! ```text
//! <root>/CURRENT
//! <root>/generations/<id>/manifest.json
//! <root>/generations/<id>/chunks.sqlite
//! <root>/generations/<id>/lexical.json.zst
//! <root>/generations/<id>/vectors.json.zst
//! ```
//! A generation directory is assembled under a temporary name and renamed
//! into place complete, then `CURRENT` is replaced via temp file + rename.

use super::chunk_table;
use super::generation::{GenerationHandle, GenerationManifest, IndexGeneration};
use super::IndexError;
use crate::config::VectorConfig;
use crate::lexical::LexicalIndex;
use crate::vector::{build_vector_index, VectorEntry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CURRENT_FILE: &str = "CURRENT";
const GENERATIONS_DIR: &str = "generations";
const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.sqlite";
const LEXICAL_FILE: &str = "lexical.json.zst";
const VECTORS_FILE: &str = "vectors.json.zst";
const TEMP_PREFIX: &str = ".tmp-";
const ZSTD_LEVEL: i32 = 3;

#[derive(Serialize)]
struct VectorArtifactRef<'a> {
    generation_id: &'a str,
    dimension: usize,
    entries: &'a [VectorEntry],
}

#[derive(Deserialize)]
struct VectorArtifact {
    generation_id: String,
    dimension: usize,
    entries: Vec<VectorEntry>,
}

/// A generation found on disk
#[derive(Debug, Clone)]
pub struct StoredGeneration {
    pub manifest: GenerationManifest,
    pub is_current: bool,
}

pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let root = root.into();
        let generations = root.join(GENERATIONS_DIR);
        fs::create_dir_all(&generations).map_err(|e| {
            IndexError::io(
                e,
                format!("Failed to create index directory: {}", generations.display()),
            )
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, generation_id: &str) -> PathBuf {
        self.root.join(GENERATIONS_DIR).join(generation_id)
    }

    /// Write every artifact, record their checksums in the manifest and make
    /// the generation current on disk.
    pub fn persist(&self, generation: &mut IndexGeneration) -> Result<PathBuf, IndexError> {
        let generation_id = generation.generation_id().to_string();
        let final_dir = self.generation_dir(&generation_id);
        if final_dir.exists() {
            return Err(IndexError::consistency(
                &generation_id,
                format!("{} already exists", final_dir.display()),
            ));
        }

        let temp_dir = self
            .root
            .join(GENERATIONS_DIR)
            .join(format!("{}{}", TEMP_PREFIX, generation_id));
        if temp_dir.exists() {
            remove_dir(&temp_dir)?;
        }
        fs::create_dir_all(&temp_dir).map_err(|e| {
            IndexError::io(e, format!("Failed to create {}", temp_dir.display()))
        })?;

        let chunks_path = temp_dir.join(CHUNKS_FILE);
        chunk_table::write(&chunks_path, &generation_id, generation.chunks())?;
        let chunks_sum = checksum_file(&chunks_path)?;

        let lexical_bytes = compress_json(generation.lexical(), LEXICAL_FILE)?;
        write_synced(&temp_dir.join(LEXICAL_FILE), &lexical_bytes)?;

        let vector = generation.vector();
        let vector_bytes = compress_json(
            &VectorArtifactRef {
                generation_id: &generation_id,
                dimension: vector.dimension(),
                entries: vector.entries(),
            },
            VECTORS_FILE,
        )?;
        write_synced(&temp_dir.join(VECTORS_FILE), &vector_bytes)?;

        let checksums = &mut generation.manifest_mut().checksums;
        checksums.clear();
        checksums.insert(CHUNKS_FILE.to_string(), chunks_sum);
        checksums.insert(LEXICAL_FILE.to_string(), checksum(&lexical_bytes));
        checksums.insert(VECTORS_FILE.to_string(), checksum(&vector_bytes));

        let manifest = serde_json::to_vec_pretty(generation.manifest()).map_err(|e| IndexError::Json {
            source: e,
            context: "Failed to serialize manifest".to_string(),
        })?;
        write_synced(&temp_dir.join(MANIFEST_FILE), &manifest)?;

        fs::rename(&temp_dir, &final_dir).map_err(|e| {
            IndexError::io(
                e,
                format!(
                    "Failed to move {} into place at {}",
                    temp_dir.display(),
                    final_dir.display()
                ),
            )
        })?;

        self.set_current(&generation_id)?;
        info!("Persisted generation {} to {}", generation_id, final_dir.display());

        Ok(final_dir)
    }

    fn set_current(&self, generation_id: &str) -> Result<(), IndexError> {
        let target = self.root.join(CURRENT_FILE);
        let temp = self.root.join(format!("{}{}", TEMP_PREFIX, CURRENT_FILE));

        write_synced(&temp, format!("{}\n", generation_id).as_bytes())?;
        fs::rename(&temp, &target).map_err(|e| {
            IndexError::io(e, format!("Failed to replace {}", target.display()))
        })
    }

    pub fn current_id(&self) -> Result<Option<String>, IndexError> {
        let path = self.root.join(CURRENT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| IndexError::io(e, format!("Failed to read {}", path.display())))?;
        let id = content.trim();
        Ok((!id.is_empty()).then(|| id.to_string()))
    }

    /// Load and validate the generation `CURRENT` points at
    pub fn load_current(&self, vector_config: &VectorConfig) -> Result<IndexGeneration, IndexError> {
        let generation_id = self
            .current_id()?
            .ok_or_else(|| IndexError::NoGeneration(self.root.clone()))?;
        self.load(&generation_id, vector_config)
    }

    pub fn load(&self, generation_id: &str, vector_config: &VectorConfig) -> Result<IndexGeneration, IndexError> {
        let dir = self.generation_dir(generation_id);
        if !dir.is_dir() {
            return Err(IndexError::NoGeneration(dir));
        }

        let manifest = read_manifest(&dir)?;
        if manifest.generation_id != generation_id {
            return Err(IndexError::consistency(
                generation_id,
                format!("manifest stamped {}", manifest.generation_id),
            ));
        }

        let stamp_mismatch = |artifact: &str, found: &str| {
            IndexError::consistency(generation_id, format!("{} stamped {}", artifact, found))
        };

        let chunks_path = dir.join(CHUNKS_FILE);
        verify_checksum(&manifest, CHUNKS_FILE, &read_file(&chunks_path)?)?;
        let (chunks_stamp, chunks) = chunk_table::read(&chunks_path)?;
        if chunks_stamp != generation_id {
            return Err(stamp_mismatch(CHUNKS_FILE, &chunks_stamp));
        }

        let lexical_bytes = read_file(&dir.join(LEXICAL_FILE))?;
        verify_checksum(&manifest, LEXICAL_FILE, &lexical_bytes)?;
        let lexical: LexicalIndex = decompress_json(&lexical_bytes, LEXICAL_FILE)?;

        let vector_bytes = read_file(&dir.join(VECTORS_FILE))?;
        verify_checksum(&manifest, VECTORS_FILE, &vector_bytes)?;
        let vectors: VectorArtifact = decompress_json(&vector_bytes, VECTORS_FILE)?;
        if vectors.generation_id != generation_id {
            return Err(stamp_mismatch(VECTORS_FILE, &vectors.generation_id));
        }

        let vector = build_vector_index(
            vectors.entries,
            vectors.dimension,
            vectors.generation_id,
            vector_config,
        )?;

        let generation = IndexGeneration::new(manifest, chunks, lexical, vector);
        generation.validate()?;

        debug!("Loaded generation {} from {}", generation_id, dir.display());
        Ok(generation)
    }

    /// All complete generations on disk, oldest first
    pub fn list_generations(&self) -> Result<Vec<StoredGeneration>, IndexError> {
        let current = self.current_id()?;
        let generations_dir = self.root.join(GENERATIONS_DIR);
        let entries = fs::read_dir(&generations_dir).map_err(|e| {
            IndexError::io(e, format!("Failed to read {}", generations_dir.display()))
        })?;

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                IndexError::io(e, format!("Failed to read {}", generations_dir.display()))
            })?;
            let path = entry.path();
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(true, |n| n.starts_with(TEMP_PREFIX));
            if !path.is_dir() || is_temp {
                continue;
            }

            match read_manifest(&path) {
                Ok(manifest) => found.push(StoredGeneration {
                    is_current: current.as_deref() == Some(manifest.generation_id.as_str()),
                    manifest,
                }),
                Err(e) => warn!("Ignoring unreadable generation {}: {}", path.display(), e),
            }
        }

        found.sort_by(|a, b| {
            a.manifest
                .created_at
                .cmp(&b.manifest.created_at)
                .then_with(|| a.manifest.generation_id.cmp(&b.manifest.generation_id))
        });
        Ok(found)
    }

    /// Delete all but the newest `keep` generations; the current one is
    /// always kept. Returns the removed ids.
    pub fn prune(&self, keep: usize) -> Result<Vec<String>, IndexError> {
        let generations = self.list_generations()?;
        let cutoff = generations.len().saturating_sub(keep);

        let mut removed = Vec::new();
        for stored in generations.into_iter().take(cutoff) {
            if stored.is_current {
                continue;
            }
            let id = stored.manifest.generation_id;
            remove_dir(&self.generation_dir(&id))?;
            info!("Pruned generation {}", id);
            removed.push(id);
        }
        Ok(removed)
    }
}

/// Persist `generation` and make it live. Validation runs first, so a
/// rejected generation touches neither the disk pointer nor the live one.
pub fn publish(
    store: &IndexStore,
    handle: &GenerationHandle,
    mut generation: IndexGeneration,
) -> Result<String, IndexError> {
    if let Err(e) = generation.validate() {
        tracing::error!("Not publishing generation: {}", e);
        return Err(e);
    }

    store.persist(&mut generation)?;
    let generation_id = generation.generation_id().to_string();
    handle.swap(generation)?;
    Ok(generation_id)
}

fn checksum(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn checksum_file(path: &Path) -> Result<String, IndexError> {
    Ok(checksum(&read_file(path)?))
}

fn verify_checksum(manifest: &GenerationManifest, artifact: &str, bytes: &[u8]) -> Result<(), IndexError> {
    let expected = manifest
        .checksums
        .get(artifact)
        .cloned()
        .unwrap_or_else(|| "<missing>".to_string());
    let actual = checksum(bytes);
    if expected != actual {
        return Err(IndexError::ChecksumMismatch {
            artifact: artifact.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn read_manifest(dir: &Path) -> Result<GenerationManifest, IndexError> {
    let bytes = read_file(&dir.join(MANIFEST_FILE))?;
    serde_json::from_slice(&bytes).map_err(|e| IndexError::Json {
        source: e,
        context: format!("Malformed manifest in {}", dir.display()),
    })
}

fn compress_json<T: Serialize + ?Sized>(value: &T, artifact: &str) -> Result<Vec<u8>, IndexError> {
    let json = serde_json::to_vec(value).map_err(|e| IndexError::Json {
        source: e,
        context: format!("Failed to serialize {}", artifact),
    })?;
    zstd::encode_all(&json[..], ZSTD_LEVEL)
        .map_err(|e| IndexError::io(e, format!("Failed to compress {}", artifact)))
}

fn decompress_json<T: serde::de::DeserializeOwned>(bytes: &[u8], artifact: &str) -> Result<T, IndexError> {
    let json = zstd::decode_all(bytes)
        .map_err(|e| IndexError::io(e, format!("Failed to decompress {}", artifact)))?;
    serde_json::from_slice(&json).map_err(|e| IndexError::Json {
        source: e,
        context: format!("Malformed {}", artifact),
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, IndexError> {
    fs::read(path).map_err(|e| IndexError::io(e, format!("Failed to read {}", path.display())))
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let mut file = fs::File::create(path)
        .map_err(|e| IndexError::io(e, format!("Failed to create {}", path.display())))?;
    file.write_all(bytes)
        .map_err(|e| IndexError::io(e, format!("Failed to write {}", path.display())))?;
    file.sync_all()
        .map_err(|e| IndexError::io(e, format!("Failed to sync {}", path.display())))
}

fn remove_dir(path: &Path) -> Result<(), IndexError> {
    fs::remove_dir_all(path).map_err(|e| IndexError::io(e, format!("Failed to remove {}", path.display())))
}
