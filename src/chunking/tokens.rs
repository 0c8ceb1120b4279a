//! Token counting used to size chunks
//!
//! Chunk budgets are expressed in model tokens. A real tokenizer gives exact
//! counts; the heuristic counter approximates subword tokenization closely
//! enough for sizing when no tokenizer file is configured.

use super::ChunkingError;
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;

/// Counts model tokens in a piece of text
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    fn name(&self) -> &str;
}

/// Subword approximation: each alphanumeric run costs one token per four
/// characters (rounded up), every other visible character costs one token
/// and whitespace is free.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

const CHARS_PER_TOKEN: usize = 4;

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, text: &str) -> usize {
        let mut tokens = 0;
        let mut run: usize = 0;

        for c in text.chars() {
            if c.is_alphanumeric() {
                run += 1;
                continue;
            }
            tokens += run.div_ceil(CHARS_PER_TOKEN);
            run = 0;
            if !c.is_whitespace() {
                tokens += 1;
            }
        }

        tokens + run.div_ceil(CHARS_PER_TOKEN)
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Exact counts from a HuggingFace `tokenizer.json`
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
    name: String,
}

impl HfTokenCounter {
    pub fn from_file(path: &Path) -> Result<Self, ChunkingError> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            ChunkingError::TokenizerLoad(format!("{}: {}", path.display(), e))
        })?;

        Ok(Self {
            tokenizer,
            name: path.display().to_string(),
        })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> usize {
        // Special tokens are excluded so counts stay additive across pieces
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                tracing::debug!("Tokenizer failed, using heuristic count: {}", e);
                HeuristicTokenCounter.count(text)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build the counter named by the chunking config
pub fn token_counter_for(
    tokenizer_file: Option<&Path>,
) -> Result<Arc<dyn TokenCounter>, ChunkingError> {
    match tokenizer_file {
        Some(path) => Ok(Arc::new(HfTokenCounter::from_file(path)?)),
        None => Ok(Arc::new(HeuristicTokenCounter)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_counts() {
        let counter = HeuristicTokenCounter;
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("   \n\n "), 0);
        assert_eq!(counter.count("cat"), 1);
        assert_eq!(counter.count("battery"), 2);
        assert_eq!(counter.count("battery 12 hours."), 5);
        assert_eq!(counter.count("IP68, 5 ATM"), 5);
    }

    #[test]
    fn test_heuristic_is_additive_across_whitespace() {
        let counter = HeuristicTokenCounter;
        let left = "The display reaches ";
        let right = "2000 nits outdoors.";
        assert_eq!(
            counter.count(left) + counter.count(right),
            counter.count(&format!("{}{}", left, right))
        );
    }

    #[test]
    fn test_missing_tokenizer_file() {
        let result = token_counter_for(Some(Path::new("/nonexistent/tokenizer.json")));
        assert!(matches!(result, Err(ChunkingError::TokenizerLoad(_))));
    }
}
