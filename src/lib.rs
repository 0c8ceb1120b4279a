//! Prodcite - hybrid retrieval for product comparison answers
//!
//! Extracted product documents (manuals, specifications, reviews) are cut into
//! token-bounded chunks, embedded, and indexed twice: a BM25 lexical index and
//! a vector index. Queries run against both and the rankings are combined with
//! Reciprocal Rank Fusion. Every result carries the product, document type and
//! page it came from. Index builds are published as immutable generations that
//! replace the live one atomically.

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod index;
pub mod ingest;
pub mod lexical;
pub mod retrieval;
pub mod vector;

pub use error::{ProdciteError, Result};
