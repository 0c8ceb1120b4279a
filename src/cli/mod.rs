//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "prodcite",
    version,
    author = "neur0map",
    about = "Hybrid BM25 + vector retrieval over product documents",
    long_about = "Prodcite chunks product manuals, specifications and reviews, indexes them for both \
                  keyword and semantic search, and answers queries with fused, citable results \
                  (product, document type, page)."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/prodcite/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a new index generation from extracted documents and make it current
    Index {
        /// Directory laid out as <product_id>/<file>.json
        input_dir: PathBuf,
    },

    /// Search the current index generation
    Search {
        /// Search query text
        query: String,

        /// Maximum number of results to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Restrict to a product (repeatable); overrides detection from the query
        #[arg(short, long = "product", value_name = "ID")]
        products: Vec<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the current generation and the stored ones
    Status,

    /// Remove old generations, keeping the newest ones and the current one
    Prune {
        /// Number of generations to keep
        #[arg(long, default_value = "3")]
        keep: usize,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_search_arguments() {
        let cli = Cli::try_parse_from([
            "prodcite",
            "search",
            "battery life",
            "-k",
            "3",
            "--product",
            "a",
            "--product",
            "b",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Search {
                query,
                top_k,
                products,
                json,
            } => {
                assert_eq!(query, "battery life");
                assert_eq!(top_k, Some(3));
                assert_eq!(products, vec!["a", "b"]);
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
