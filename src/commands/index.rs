//! Index command - run a full or incremental pass over one or more libraries

use crate::chunk::TextChunker;
use crate::config::Config;
use crate::embed::HttpEmbedder;
use crate::error::{Error, Result};
use crate::extract::PdfExtractor;
use crate::index::jobs::JobRegistry;
use crate::index::{IndexRequest, Indexer};
use crate::meta::MetaDb;
use crate::models::{IndexingMode, IndexingStats, RunStatus};
use crate::progress::item_progress_bar;
use crate::store::VectorStore;
use crate::zotero::{DocumentSource, LibraryInfo, LibraryRef, ZoteroLocalApi};
use std::sync::Arc;
use tracing::{info, warn};

/// Index command options
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Library to index; defaults to the user library
    pub library_id: Option<String>,
    /// Index every library the source reports
    pub all: bool,
    pub mode: IndexingMode,
    /// Stop after this many items (diagnostic runs)
    pub max_items: Option<usize>,
    pub show_progress: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            library_id: None,
            all: false,
            mode: IndexingMode::Auto,
            max_items: None,
            show_progress: true,
        }
    }
}

/// Execute the index command. Returns one stats entry per library indexed.
pub async fn cmd_index(
    config: &Config,
    db: Arc<MetaDb>,
    options: IndexOptions,
) -> Result<Vec<IndexingStats>> {
    let source = Arc::new(ZoteroLocalApi::new(&config.zotero)?);
    source.check_connection().await?;

    let store = Arc::new(VectorStore::connect(config).await?);
    store.ensure_collections().await?;

    let embedder = Arc::new(HttpEmbedder::new(&config.embedding)?);

    let indexer = Indexer {
        source: source.clone(),
        extractor: Arc::new(PdfExtractor),
        embedder,
        chunks: store.clone(),
        dedup: store,
        meta: db,
        chunker: TextChunker::new(config.chunk.max_chars, config.chunk.overlap_chars),
        embed_batch_size: config.embedding.batch_size,
        item_chunk_cap: config.indexing.item_chunk_cap,
    };

    let libraries = resolve_libraries(source.as_ref(), &options).await?;
    let registry = JobRegistry::new();
    let mut results = Vec::with_capacity(libraries.len());

    for library in libraries {
        let claim = registry.begin(&library.id)?;

        // Ctrl-C requests cooperative cancellation between items
        let cancel = claim.cancel.clone();
        let signal_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, finishing current item");
                cancel.cancel();
            }
        });

        let mut request = IndexRequest::new(
            LibraryRef::new(library.id.clone(), library.kind),
            library.name.clone(),
        );
        request.mode = options.mode;
        request.max_items = options.max_items;
        request.cancel = claim.cancel.clone();

        if options.show_progress {
            let bar = item_progress_bar(0);
            request.progress = Some(Box::new(move |done, total| {
                bar.set_length(total);
                bar.set_position(done);
                if done == total {
                    bar.finish_and_clear();
                }
            }));
        }

        match indexer.index_library(&request).await {
            Ok(stats) => {
                registry.finish(&library.id, stats.clone());
                results.push(stats);
            }
            Err(e) => {
                warn!("Indexing library {} failed: {}", library.id, e);
                registry.fail(&library.id, &e);
                let mut stats = IndexingStats::new(options.mode);
                stats.status = RunStatus::Error;
                stats.error = Some(e.to_string());
                results.push(stats);
            }
        }

        signal_task.abort();
    }

    Ok(results)
}

async fn resolve_libraries(
    source: &dyn DocumentSource,
    options: &IndexOptions,
) -> Result<Vec<LibraryInfo>> {
    let available = source.list_libraries().await?;

    if options.all {
        info!("Indexing all {} libraries", available.len());
        return Ok(available);
    }

    let wanted = options.library_id.as_deref().unwrap_or("0");
    available
        .into_iter()
        .find(|l| l.id == wanted)
        .map(|l| vec![l])
        .ok_or_else(|| Error::LibraryNotFound(wanted.to_string()))
}

/// Print indexing stats to console
pub fn print_index_stats(stats: &IndexingStats) {
    let marker = match stats.status {
        RunStatus::Completed => "✓",
        RunStatus::Cancelled => "⏸",
        _ => "✗",
    };
    println!("\n{} Indexing {} ({} mode)\n", marker, stats.status, stats.mode);
    println!("Items processed: {}", stats.items_processed);
    println!("  Added:   {}", stats.items_added);
    println!("  Updated: {}", stats.items_updated);
    println!("Chunks added:   {}", stats.chunks_added);
    if stats.chunks_deleted > 0 {
        println!("Chunks deleted: {}", stats.chunks_deleted);
    }
    if stats.chunks_skipped > 0 {
        println!("Chunks skipped: {}", stats.chunks_skipped);
    }
    if stats.errors > 0 {
        println!("Item errors:    {}", stats.errors);
    }
    println!("Library version: {}", stats.last_version);
    println!("Elapsed: {:.1}s", stats.elapsed_seconds);

    if let Some(error) = &stats.error {
        println!("\nError: {}", error);
    }
}
