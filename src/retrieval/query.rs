//! Query analysis: which products a question is about, and whether it
//! compares them

use super::RetrievalError;
use crate::config::ProductConfig;
use crate::filter::SearchFilter;
use crate::lexical::tokenize;
use regex::Regex;
use std::collections::BTreeMap;

/// Tokens that mark a question as a comparison (English and German)
const COMPARISON_CUES: &[&str] = &[
    "vs",
    "versus",
    "compare",
    "comparison",
    "difference",
    "better",
    "vergleich",
    "unterschied",
    "besser",
];

/// Compiled keyword matchers, one per product
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: Vec<(String, Regex)>,
}

impl ProductCatalog {
    /// Build from the `[products.<id>]` config tables
    pub fn from_config(products: &BTreeMap<String, ProductConfig>) -> Result<Self, RetrievalError> {
        let mut compiled = Vec::with_capacity(products.len());

        for (product_id, product) in products {
            let keywords: Vec<String> = product
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .map(|k| regex::escape(&k))
                .collect();

            if keywords.is_empty() {
                tracing::debug!("Product {} has no keywords, skipping", product_id);
                continue;
            }

            let pattern = format!("(?i)(?:{})", keywords.join("|"));
            let regex = Regex::new(&pattern).map_err(|e| {
                RetrievalError::Config(format!(
                    "Invalid keywords for product {}: {}",
                    product_id, e
                ))
            })?;
            compiled.push((product_id.clone(), regex));
        }

        Ok(Self { products: compiled })
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Product ids whose keywords occur in `query`, in catalog order
    pub fn detect(&self, query: &str) -> Vec<String> {
        self.products
            .iter()
            .filter(|(_, regex)| regex.is_match(query))
            .map(|(product_id, _)| product_id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryAnalysis {
    pub target_products: Vec<String>,
    pub is_comparison: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QueryAnalyzer {
    catalog: ProductCatalog,
}

impl QueryAnalyzer {
    pub fn new(catalog: ProductCatalog) -> Self {
        Self { catalog }
    }

    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        let target_products = self.catalog.detect(query);
        let has_cue = tokenize(query)
            .iter()
            .any(|token| COMPARISON_CUES.contains(&token.as_str()));

        QueryAnalysis {
            is_comparison: has_cue || target_products.len() >= 2,
            target_products,
        }
    }
}

/// One query with its options
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    pub filter: SearchFilter,
    /// Overrides `retrieval.diversity` when set
    pub diversity: Option<bool>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, top_k: usize) -> Self {
        Self {
            query: query.into(),
            top_k,
            filter: SearchFilter::none(),
            diversity: None,
        }
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_diversity(mut self, diversity: bool) -> Self {
        self.diversity = Some(diversity);
        self
    }

    /// Detected products become the filter; comparisons turn on diversity
    pub fn from_analysis(query: impl Into<String>, top_k: usize, analysis: &QueryAnalysis) -> Self {
        let request = Self::new(query, top_k)
            .with_filter(SearchFilter::for_products(analysis.target_products.clone()));

        if analysis.is_comparison {
            request.with_diversity(true)
        } else {
            request
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> QueryAnalyzer {
        let mut products = BTreeMap::new();
        products.insert(
            "apple_watch_series11_2025".to_string(),
            ProductConfig {
                keywords: vec!["apple watch".to_string(), "series 11".to_string()],
            },
        );
        products.insert(
            "garmin_forerunner_970_2025".to_string(),
            ProductConfig {
                keywords: vec!["garmin".to_string(), "forerunner".to_string()],
            },
        );
        QueryAnalyzer::new(ProductCatalog::from_config(&products).unwrap())
    }

    #[test]
    fn test_single_product_detected() {
        let analysis = analyzer().analyze("How long does the Garmin battery last?");
        assert_eq!(analysis.target_products, vec!["garmin_forerunner_970_2025"]);
        assert!(!analysis.is_comparison);
    }

    #[test]
    fn test_two_products_is_comparison() {
        let analysis = analyzer().analyze("Apple Watch or Forerunner for running?");
        assert_eq!(analysis.target_products.len(), 2);
        assert!(analysis.is_comparison);
    }

    #[test]
    fn test_german_cue_is_comparison() {
        let analysis = analyzer().analyze("Welche Uhr hat die bessere Akkulaufzeit, was ist besser?");
        assert!(analysis.target_products.is_empty());
        assert!(analysis.is_comparison);
    }

    #[test]
    fn test_cue_must_be_whole_token() {
        // "vs" inside another word is not a cue
        let analysis = analyzer().analyze("canvas strap options");
        assert!(!analysis.is_comparison);
    }

    #[test]
    fn test_keywords_are_escaped() {
        let mut products = BTreeMap::new();
        products.insert(
            "x".to_string(),
            ProductConfig {
                keywords: vec!["c++ (pro)".to_string()],
            },
        );
        let catalog = ProductCatalog::from_config(&products).unwrap();
        assert_eq!(catalog.detect("is the C++ (Pro) any good"), vec!["x"]);
        assert!(catalog.detect("ccc pro").is_empty());
    }

    #[test]
    fn test_request_from_analysis() {
        let analysis = analyzer().analyze("apple watch vs garmin");
        let request = SearchRequest::from_analysis("apple watch vs garmin", 5, &analysis);

        assert_eq!(request.diversity, Some(true));
        assert_eq!(request.filter.product_ids.len(), 2);

        let plain = SearchRequest::from_analysis("battery", 5, &analyzer().analyze("battery"));
        assert!(plain.filter.is_empty());
        assert_eq!(plain.diversity, None);
    }
}
