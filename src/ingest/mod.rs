//! Extracted documents: the hand-off point from text extraction
//!
//! Extraction writes one JSON file per source document under a directory per
//! product. This module turns that layout into [`Document`] values, inferring
//! the document type from the file name and attaching citation metadata from
//! the optional `sources.json` sidecar.

mod sources;

pub use sources::{SourceInfo, SourceMap};

use crate::error::{ProdciteError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Kind of source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    Manual,
    Specification,
    Review,
}

impl DocType {
    /// Infer the type from a file name: "manual", then "spec", then "review"
    pub fn infer(filename: &str) -> Option<Self> {
        let lower = filename.to_lowercase();
        if lower.contains("manual") {
            Some(Self::Manual)
        } else if lower.contains("spec") {
            Some(Self::Specification)
        } else if lower.contains("review") {
            Some(Self::Review)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Specification => "specification",
            Self::Review => "review",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "specification" => Ok(Self::Specification),
            "review" => Ok(Self::Review),
            other => Err(format!("unknown document type '{}'", other)),
        }
    }
}

/// Text of one page, 1-indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

/// One source file's extracted text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub product_id: String,
    pub doc_type: DocType,
    pub source_file: String,
    pub pages: Vec<PageText>,
    pub source_url: Option<String>,
    pub source_name: Option<String>,
}

impl Document {
    pub fn new(
        product_id: impl Into<String>,
        doc_type: DocType,
        source_file: impl Into<String>,
        pages: Vec<PageText>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            doc_type,
            source_file: source_file.into(),
            pages,
            source_url: None,
            source_name: None,
        }
    }

    pub fn with_source(mut self, source: SourceInfo) -> Self {
        self.source_url = source.source_url;
        self.source_name = source.source_name;
        self
    }
}

/// A file that was not turned into a document, and why
#[derive(Debug, Clone)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of loading an extraction directory
#[derive(Debug, Default)]
pub struct CorpusLoad {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedEntry>,
}

/// Load every extracted document under `input_dir`
///
/// Layout: `<input_dir>/<product_id>/**/<name>.json`, each file a JSON array of
/// `{"page_number": n, "text": "..."}`. Bad files are skipped and reported,
/// never fatal; only a missing input directory is an error.
pub fn load_corpus(input_dir: &Path) -> Result<CorpusLoad> {
    if !input_dir.is_dir() {
        return Err(ProdciteError::Ingest(format!(
            "Input directory not found: {}",
            input_dir.display()
        )));
    }

    let sources = SourceMap::load(&input_dir.join("sources.json"));
    let mut load = CorpusLoad::default();

    let mut product_dirs = Vec::new();
    for entry in read_dir_sorted(input_dir)? {
        if entry.is_dir() {
            product_dirs.push(entry);
        }
    }

    for product_dir in product_dirs {
        let Some(product_id) = product_dir.file_name().and_then(|n| n.to_str()) else {
            load.skipped.push(SkippedEntry {
                path: product_dir.clone(),
                reason: "product directory name is not valid UTF-8".to_string(),
            });
            continue;
        };

        let mut files = Vec::new();
        collect_json_files(&product_dir, &mut files)?;

        for file in files {
            match load_document(product_id, &product_dir, &file, &sources) {
                Ok(document) => {
                    debug!(
                        "Loaded {} ({} pages) as {} {}",
                        file.display(),
                        document.pages.len(),
                        document.product_id,
                        document.doc_type
                    );
                    load.documents.push(document);
                }
                Err(reason) => {
                    warn!("Skipping {}: {}", file.display(), reason);
                    load.skipped.push(SkippedEntry { path: file, reason });
                }
            }
        }
    }

    info!(
        "Loaded {} documents from {} ({} skipped)",
        load.documents.len(),
        input_dir.display(),
        load.skipped.len()
    );

    Ok(load)
}

fn load_document(
    product_id: &str,
    product_dir: &Path,
    file: &Path,
    sources: &SourceMap,
) -> std::result::Result<Document, String> {
    let relative = file
        .strip_prefix(product_dir)
        .map_err(|e| e.to_string())?
        .to_string_lossy()
        .replace('\\', "/");

    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| "file name is not valid UTF-8".to_string())?;

    let doc_type = DocType::infer(file_name)
        .ok_or_else(|| format!("cannot infer document type from '{}'", file_name))?;

    let content = std::fs::read_to_string(file).map_err(|e| e.to_string())?;
    let pages: Vec<PageText> =
        serde_json::from_str(&content).map_err(|e| format!("malformed page list: {}", e))?;

    let (source_file, source) = match sources.lookup(product_id, &relative) {
        Some((key, info)) => (key, info),
        None => (relative, SourceInfo::default()),
    };

    Ok(Document::new(product_id, doc_type, source_file, pages).with_source(source))
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ProdciteError::Io {
        source: e,
        context: format!("Failed to read directory: {}", dir.display()),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ProdciteError::Io {
            source: e,
            context: format!("Failed to read directory entry in {}", dir.display()),
        })?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for path in read_dir_sorted(dir)? {
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_inference() {
        assert_eq!(DocType::infer("Garmin_Manual_EN.pdf"), Some(DocType::Manual));
        assert_eq!(DocType::infer("tech-specs.json"), Some(DocType::Specification));
        assert_eq!(DocType::infer("specification_sheet"), Some(DocType::Specification));
        assert_eq!(DocType::infer("reviews/dcrainmaker_review"), Some(DocType::Review));
        assert_eq!(DocType::infer("brochure.json"), None);
    }

    #[test]
    fn test_manual_wins_over_spec() {
        assert_eq!(DocType::infer("spec_manual.json"), Some(DocType::Manual));
    }

    #[test]
    fn test_doc_type_round_trip_through_str() {
        for doc_type in [DocType::Manual, DocType::Specification, DocType::Review] {
            assert_eq!(doc_type.as_str().parse::<DocType>(), Ok(doc_type));
        }
    }
}
