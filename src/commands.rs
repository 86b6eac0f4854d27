use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, get_config_dir};
use crate::embeddings::{EmbeddingCache, EmbeddingService};
use crate::indexer::{ConsistencyValidator, IndexingCoordinator, JobState};
use crate::library::{DocumentLibrary, FsLibrary};
use crate::search::{SearchEngine, SearchHit, SearchMode, SearchRequest, SearchScope};
use crate::store::IndexStore;

/// Everything a command needs, wired from configuration.
struct App {
    config: Config,
    store: Arc<IndexStore>,
    service: Arc<EmbeddingService>,
    library: Arc<FsLibrary>,
}

impl App {
    async fn build() -> Result<Self> {
        let config_dir = get_config_dir()?;
        let config = Config::load(&config_dir).context("Failed to load configuration")?;

        let store = Arc::new(
            IndexStore::open(config.data_dir())
                .await
                .context("Failed to open index store")?,
        );
        let cache = Arc::new(EmbeddingCache::new(config.embedding.cache_capacity));
        let service = Arc::new(
            EmbeddingService::from_config(&config, Some(cache))
                .context("Failed to build embedding service")?,
        );
        let library = Arc::new(FsLibrary::new(config.library_root()));

        Ok(Self {
            config,
            store,
            service,
            library,
        })
    }

    fn coordinator(&self) -> IndexingCoordinator {
        IndexingCoordinator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.service),
            self.library.clone(),
            self.config.chunking.clone(),
            self.config.embedding.batch_size,
        )
    }

    fn engine(&self) -> SearchEngine {
        SearchEngine::new(
            Arc::clone(&self.store),
            Arc::clone(&self.service),
            self.library.clone(),
            self.config.search.clone(),
        )
    }
}

/// Index one document, or the whole library with `--all`.
#[inline]
pub async fn index_documents(document: Option<String>, all: bool) -> Result<()> {
    let app = App::build().await?;

    let document_ids: Vec<String> = if all {
        app.library
            .list_documents()
            .context("Failed to list library documents")?
            .into_iter()
            .map(|meta| meta.id)
            .collect()
    } else {
        match document {
            Some(id) => vec![id],
            None => bail!("pass a document id or --all"),
        }
    };
    if document_ids.is_empty() {
        println!("Library is empty; nothing to index.");
        return Ok(());
    }

    let coordinator = app.coordinator();
    for document_id in document_ids {
        info!("Indexing document '{document_id}'");
        let handle = coordinator
            .start(&document_id)
            .with_context(|| format!("Failed to start indexing '{document_id}'"))?;
        if handle.joined {
            println!("'{document_id}' is already being indexed; following its progress.");
        }

        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{msg:20} [{bar:40.cyan/blue}] {pos}/{len}")
                .context("Invalid progress template")?,
        );
        bar.set_message(document_id.clone());

        let mut progress = handle.progress();
        let outcome = loop {
            let event = progress.borrow_and_update().clone();
            bar.set_length(event.total as u64);
            bar.set_position(event.current as u64);
            if event.state.is_terminal() {
                break event;
            }
            if progress.changed().await.is_err() {
                break progress.borrow().clone();
            }
        };
        bar.finish_and_clear();

        match outcome.state {
            JobState::Completed => println!(
                "{} '{}': {} chunks indexed",
                style("Completed").green(),
                document_id,
                outcome.current
            ),
            JobState::Cancelled => println!(
                "{} '{}': {} of {} chunks committed",
                style("Cancelled").yellow(),
                document_id,
                outcome.current,
                outcome.total
            ),
            JobState::Failed => println!(
                "{} '{}' after {} of {} chunks: {}",
                style("Failed").red(),
                document_id,
                outcome.current,
                outcome.total,
                outcome.error.unwrap_or_else(|| "unknown error".to_string())
            ),
            state => println!("'{document_id}' ended in unexpected state {state}"),
        }
    }

    Ok(())
}

/// Run a search and print the ranked hits.
#[inline]
pub async fn search(
    query: String,
    mode: SearchMode,
    document: Option<String>,
    limit: usize,
    minimum_score: Option<f32>,
    opposing: Option<String>,
    markers_only: bool,
) -> Result<()> {
    let app = App::build().await?;
    let engine = app.engine();

    let mut request = SearchRequest::new(query, mode).with_limit(limit);
    if let Some(document_id) = document {
        request = request.with_scope(SearchScope::Document(document_id));
    }
    if let Some(floor) = minimum_score {
        request = request.with_minimum_score(floor);
    }
    if let Some(opposing_query) = opposing {
        request = request.with_opposing_query(opposing_query);
    }
    request.filter.argument_markers_only = markers_only;

    let hits = engine.search(&request).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        print_hit(rank + 1, hit);
    }
    Ok(())
}

fn print_hit(rank: usize, hit: &SearchHit) {
    let probe = match hit.matched_probe {
        Some(crate::search::Probe::Direct) => " [direct]",
        Some(crate::search::Probe::Opposing) => " [opposing]",
        None => "",
    };
    println!(
        "{:>2}. {} {} (chunk {}){}",
        rank,
        style(format!("{:.3}", hit.score)).cyan(),
        style(&hit.document_id).bold(),
        hit.chunk.ordinal,
        style(probe).magenta()
    );
    println!("    {}", snippet(&hit.chunk.content, 160));
}

fn snippet(text: &str, max_chars: usize) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out: String = collapsed.chars().take(max_chars).collect();
    if collapsed.chars().count() > max_chars {
        out.push('…');
    }
    out
}

/// List indexes, for the whole library or one document.
#[inline]
pub async fn list_indexes(document: Option<String>) -> Result<()> {
    let app = App::build().await?;

    let indexes = match &document {
        Some(document_id) => app.store.list_indexes_for_document(document_id).await?,
        None => app.store.list_all_indexes().await?,
    };
    if indexes.is_empty() {
        match document {
            Some(document_id) => println!("No indexes for '{document_id}'."),
            None => println!("No indexes yet. Run `corpus-search index --all` to create some."),
        }
        return Ok(());
    }

    println!(
        "{:>4}  {:20} {:28} {:>6} {:>7}  {}",
        "id", "document", "provider/model", "dims", "chunks", "updated"
    );
    for index in indexes {
        println!(
            "{:>4}  {:20} {:28} {:>6} {:>7}  {}",
            index.id,
            index.document_id,
            format!("{}/{}", index.provider_name, index.model_id),
            index.dimensions,
            index.total_chunks,
            index.updated_date.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

/// Delete one index by id, or every index of a document.
#[inline]
pub async fn remove(document: Option<String>, index_id: Option<i64>) -> Result<()> {
    let app = App::build().await?;

    match (document, index_id) {
        (_, Some(id)) => {
            app.store.delete_index(id).await?;
            println!("Deleted index {id}.");
        }
        (Some(document_id), None) => {
            let indexes = app.store.list_indexes_for_document(&document_id).await?;
            if indexes.is_empty() {
                println!("No indexes for '{document_id}'.");
                return Ok(());
            }
            let count = indexes.len();
            for index in indexes {
                app.store.delete_index(index.id).await?;
            }
            println!("Deleted {count} indexes for '{document_id}'.");
        }
        (None, None) => bail!("pass a document id or --index-id"),
    }
    Ok(())
}

/// Summarise the store and library.
#[inline]
pub async fn status() -> Result<()> {
    let app = App::build().await?;

    let documents = app
        .library
        .list_documents()
        .context("Failed to list library documents")?;
    let indexes = app.store.list_all_indexes().await?;
    let total_chunks: i64 = indexes.iter().map(|i| i.total_chunks).sum();

    println!("Library root: {}", app.config.library_root().display());
    println!("Documents: {}", documents.len());
    println!("Indexes: {} ({total_chunks} chunks)", indexes.len());
    println!(
        "Embedding: {} via {}",
        app.service.model_id(),
        app.service.provider_name()
    );

    let indexed: std::collections::HashSet<&str> =
        indexes.iter().map(|i| i.document_id.as_str()).collect();
    let pending: Vec<&str> = documents
        .iter()
        .map(|d| d.id.as_str())
        .filter(|id| !indexed.contains(id))
        .collect();
    if !pending.is_empty() {
        println!("Not yet indexed: {}", pending.join(", "));
    }
    Ok(())
}

/// Cross-check metadata against vector files, optionally repairing.
#[inline]
pub async fn check(repair: bool) -> Result<()> {
    let app = App::build().await?;

    let validator = ConsistencyValidator::new(&app.store).with_embeddings(&app.service);
    let report = validator.validate().await?;

    if report.is_consistent() {
        println!(
            "{} ({} indexes checked)",
            style("Store is consistent").green(),
            report.checked_indexes
        );
        return Ok(());
    }

    println!(
        "{} across {} indexes:",
        style(format!("{} issues", report.issues.len())).red(),
        report.checked_indexes
    );
    for issue in &report.issues {
        println!(
            "  index {} ('{}'): {:?}",
            issue.index_id, issue.document_id, issue.kind
        );
    }

    if repair {
        let repaired = validator.repair(&report).await?;
        println!("Repaired {repaired} issues.");
    } else {
        println!("Run with --repair to fix.");
    }
    Ok(())
}
