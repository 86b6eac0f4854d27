use clap::{Parser, Subcommand};
use corpus_search::Result;
use corpus_search::commands::{check, index_documents, list_indexes, remove, search, status};
use corpus_search::config::{Config, get_config_dir, run_interactive_config, show_config};
use corpus_search::search::SearchMode;

#[derive(Parser)]
#[command(name = "corpus-search")]
#[command(about = "Multi-index embedding store and semantic search for document libraries")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure embedding providers and search settings
    Config {
        /// Show current configuration instead of editing it
        #[arg(long)]
        show: bool,
    },
    /// Index a document (or the whole library) under the active configuration
    Index {
        /// Document id (file stem in the library)
        document: Option<String>,
        /// Index every document in the library
        #[arg(long)]
        all: bool,
    },
    /// Search the indexed library
    Search {
        /// Query text
        query: String,
        /// Retrieval mode: semantic, dialectical, genealogical or hybrid
        #[arg(long, default_value = "semantic")]
        mode: SearchMode,
        /// Restrict the search to one document
        #[arg(long)]
        document: Option<String>,
        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Drop results scoring below this floor
        #[arg(long)]
        min_score: Option<f32>,
        /// Explicit oppositional query for dialectical mode
        #[arg(long)]
        opposing: Option<String>,
        /// Only consider chunks tagged with an argument marker
        #[arg(long)]
        markers_only: bool,
    },
    /// List indexes, for the whole library or one document
    Indexes {
        /// Document id to filter by
        document: Option<String>,
    },
    /// Delete indexes
    Remove {
        /// Document whose indexes should be deleted
        document: Option<String>,
        /// Delete a single index by id instead
        #[arg(long)]
        index_id: Option<i64>,
    },
    /// Show library and index status
    Status,
    /// Validate store consistency
    Check {
        /// Repair the issues found
        #[arg(long)]
        repair: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                let config = Config::load(get_config_dir()?)?;
                show_config(&config)?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Index { document, all } => index_documents(document, all).await?,
        Commands::Search {
            query,
            mode,
            document,
            limit,
            min_score,
            opposing,
            markers_only,
        } => search(query, mode, document, limit, min_score, opposing, markers_only).await?,
        Commands::Indexes { document } => list_indexes(document).await?,
        Commands::Remove { document, index_id } => remove(document, index_id).await?,
        Commands::Status => status().await?,
        Commands::Check { repair } => check(repair).await?,
    }

    Ok(())
}
