//! Metadata restrictions shared by the lexical and vector branches

use crate::chunking::ChunkMetadata;
use crate::ingest::DocType;
use serde::{Deserialize, Serialize};

/// Restricts candidates by product and document type. Empty lists mean no
/// restriction on that attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub product_ids: Vec<String>,
    pub doc_types: Vec<DocType>,
}

impl SearchFilter {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_products<I, S>(product_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            product_ids: product_ids.into_iter().map(Into::into).collect(),
            doc_types: Vec::new(),
        }
    }

    pub fn with_doc_types(mut self, doc_types: impl IntoIterator<Item = DocType>) -> Self {
        self.doc_types = doc_types.into_iter().collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.product_ids.is_empty() && self.doc_types.is_empty()
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        (self.product_ids.is_empty() || self.product_ids.iter().any(|p| *p == metadata.product_id))
            && (self.doc_types.is_empty() || self.doc_types.contains(&metadata.doc_type))
    }
}
