use prodcite::cli::{Cli, Commands, ConfigAction};
use prodcite::config::Config;
use prodcite::embedding::provider_for_model;
use prodcite::error::{ProdciteError, Result};
use prodcite::filter::SearchFilter;
use prodcite::index::{publish, GenerationHandle, IndexStore, IndexingPipeline};
use prodcite::ingest::load_corpus;
use prodcite::retrieval::{
    HybridRetriever, ProductCatalog, QueryAnalyzer, SearchRequest, SearchResponse,
};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Index { input_dir } => {
            cmd_index(cli.config, &input_dir)?;
        }
        Commands::Search {
            query,
            top_k,
            products,
            json,
        } => {
            cmd_search(cli.config, &query, top_k, products, json)?;
        }
        Commands::Status => {
            cmd_status(cli.config)?;
        }
        Commands::Prune { keep } => {
            cmd_prune(cli.config, keep)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "prodcite=debug" } else { "prodcite=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| ProdciteError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

fn open_store(config: &Config) -> Result<IndexStore> {
    Ok(IndexStore::open(config.index_dir()?)?)
}

fn cmd_index(config_path: Option<PathBuf>, input_dir: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    let corpus = load_corpus(input_dir)?;
    for skipped in &corpus.skipped {
        println!("  skipped {}: {}", skipped.path.display(), skipped.reason);
    }

    let provider = provider_for_model(&config.embedding.model)?;
    let pipeline = IndexingPipeline::from_config(&config, provider)?;
    let generation = runtime()?.block_on(pipeline.run(&corpus.documents))?;

    let manifest = generation.manifest().clone();
    let store = open_store(&config)?;
    let handle = GenerationHandle::new();
    let generation_id = publish(&store, &handle, generation)?;

    println!("✓ Index generation {} is current", generation_id);
    println!("  Documents: {}", manifest.document_count);
    println!("  Chunks:    {}", manifest.chunk_count);
    println!("  Vectors:   {}", manifest.vector_count);
    if !manifest.excluded_chunk_ids.is_empty() {
        println!(
            "  Excluded from vector search: {}",
            manifest.excluded_chunk_ids.join(", ")
        );
    }
    println!("  Location:  {}", store.root().display());

    Ok(())
}

fn cmd_search(
    config_path: Option<PathBuf>,
    query: &str,
    top_k: Option<usize>,
    products: Vec<String>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let top_k = top_k.unwrap_or(config.retrieval.top_k);

    let store = open_store(&config)?;
    let handle = GenerationHandle::new();
    handle.swap(store.load_current(&config.vector)?)?;

    let request = if products.is_empty() {
        let analyzer = QueryAnalyzer::new(ProductCatalog::from_config(&config.products)?);
        let analysis = analyzer.analyze(query);
        tracing::debug!(
            "Query targets {:?} (comparison: {})",
            analysis.target_products,
            analysis.is_comparison
        );
        SearchRequest::from_analysis(query, top_k, &analysis)
    } else {
        let compare = products.len() > 1;
        let request =
            SearchRequest::new(query, top_k).with_filter(SearchFilter::for_products(products));
        if compare {
            request.with_diversity(true)
        } else {
            request
        }
    };

    let provider = provider_for_model(&config.embedding.model)?;
    let retriever = HybridRetriever::new(handle, provider, config.retrieval.clone())?;
    let response = runtime()?.block_on(retriever.search_with(&request, &CancellationToken::new()))?;

    if json {
        let output = serde_json::to_string_pretty(&response).map_err(|e| ProdciteError::Json {
            source: e,
            context: "Failed to serialize search results".to_string(),
        })?;
        println!("{}", output);
    } else {
        print_response(query, &response);
    }

    Ok(())
}

fn print_response(query: &str, response: &SearchResponse) {
    if let Some(branch) = response.degraded {
        println!("⚠ {} search unavailable, showing partial results", branch);
    }

    if response.results.is_empty() {
        println!("No results for \"{}\"", query);
        return;
    }

    println!(
        "Results for \"{}\" (generation {}):\n",
        query, response.generation_id
    );
    for (i, result) in response.results.iter().enumerate() {
        let rank = |r: Option<usize>| r.map_or_else(|| "-".to_string(), |r| r.to_string());
        println!(
            "{}. [{}] rrf {:.4} (lexical {}, vector {})",
            i + 1,
            result.citation_label(),
            result.rrf_score,
            rank(result.lexical_rank),
            rank(result.vector_rank)
        );
        println!("   {}", result.preview(200));
        if let Some(url) = &result.chunk.source_url {
            println!("   {}", url);
        }
        println!();
    }
}

fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let generations = store.list_generations()?;

    println!("Prodcite Status");
    println!("===============");
    println!("\nIndex: {}", store.root().display());

    match generations.iter().find(|g| g.is_current) {
        Some(current) => {
            let manifest = &current.manifest;
            println!("\nCurrent generation: {}", manifest.generation_id);
            println!(
                "  Created:   {}",
                manifest.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!(
                "  Model:     {} ({} dims)",
                manifest.embedding_model, manifest.embedding_dimension
            );
            println!("  Documents: {}", manifest.document_count);
            println!("  Chunks:    {}", manifest.chunk_count);
            println!(
                "  Vectors:   {} ({} excluded)",
                manifest.vector_count,
                manifest.excluded_chunk_ids.len()
            );
        }
        None => println!("\nNo current generation. Run 'prodcite index <INPUT_DIR>' first."),
    }

    println!("\nGenerations: {} total", generations.len());
    for stored in generations.iter().rev() {
        println!(
            "  {}{} - {} chunks",
            stored.manifest.generation_id,
            if stored.is_current { " (current)" } else { "" },
            stored.manifest.chunk_count
        );
    }

    Ok(())
}

fn cmd_prune(config_path: Option<PathBuf>, keep: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let removed = store.prune(keep)?;

    if removed.is_empty() {
        println!("Nothing to prune");
    } else {
        println!("✓ Removed {} generation(s)", removed.len());
        for id in removed {
            println!("  {}", id);
        }
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
            println!("  Products: {}", config.products.len());
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ProdciteError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'prodcite config init' to create one."
        );
        return Ok(Config::default());
    }

    Config::load(&path)
}
