//! Lexical (BM25) retrieval branch
mod index;
mod tokenizer;

pub use index::{Bm25Params, LexicalIndex, Posting};
pub use tokenizer::tokenize;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LexicalIndexError {
    #[error("Lexical search cancelled")]
    Cancelled,

    #[error("Corrupt lexical index: {0}")]
    Corrupt(String),
}
