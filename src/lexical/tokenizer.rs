//! The one tokenizer used for indexing and querying
//!
//! Splits on non-alphanumeric characters and lowercases, so "IP68," and
//! "ip68" produce the same term. No stemming or stop words: product
//! documents are mixed-language and short terms like "gps" matter.

use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer, TokenStream};

fn analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .build()
}

/// Lowercased alphanumeric tokens of `text`, in order, repeats kept
pub fn tokenize(text: &str) -> Vec<String> {
    let mut analyzer = analyzer();
    let mut stream = analyzer.token_stream(text);

    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_and_lowercases() {
        assert_eq!(
            tokenize("Battery: 12 Hours (GPS-mode), IP68!"),
            vec!["battery", "12", "hours", "gps", "mode", "ip68"]
        );
    }

    #[test]
    fn test_keeps_repeats_and_non_ascii() {
        assert_eq!(
            tokenize("Akku Akku Größe"),
            vec!["akku", "akku", "größe"]
        );
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        assert!(tokenize("").is_empty());
        assert!(tokenize(" -- ?! ").is_empty());
    }
}
