//! `sources.json` sidecar: citation URLs per product and file

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Citation metadata for one source file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub source_url: Option<String>,
    pub source_name: Option<String>,
}

/// product_id -> file key -> source info
///
/// File keys name the original file (e.g. `reviews/rtings.pdf`). Extracted
/// JSON files share the path but not the extension, so matching ignores
/// extensions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct SourceMap {
    products: BTreeMap<String, BTreeMap<String, SourceInfo>>,
}

impl SourceMap {
    /// Load the sidecar; a missing or malformed file yields an empty map
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));

        match parsed {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(
                    "Ignoring source metadata {}: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Find the entry for a file, trying the relative path first and then the
    /// bare file name. Returns the sidecar key with its info.
    pub fn lookup(&self, product_id: &str, relative_path: &str) -> Option<(String, SourceInfo)> {
        let files = self.products.get(product_id)?;

        let wanted = strip_extension(relative_path);
        if let Some((key, info)) = files.iter().find(|(key, _)| strip_extension(key) == wanted) {
            return Some((key.clone(), info.clone()));
        }

        let wanted_name = file_stem(relative_path);
        files
            .iter()
            .find(|(key, _)| file_stem(key) == wanted_name)
            .map(|(key, info)| (key.clone(), info.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..name_start + dot],
        _ => path,
    }
}

fn file_stem(path: &str) -> &str {
    let stripped = strip_extension(path);
    stripped.rsplit('/').next().unwrap_or(stripped)
}
