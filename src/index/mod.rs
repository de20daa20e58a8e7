//! Indexing orchestration
//!
//! Drives a full or incremental pass over one library: mode selection,
//! per-item version comparison, extraction, chunking, embedding, storage,
//! and watermark bookkeeping.

pub mod jobs;

use crate::chunk::{compute_content_hash, TextChunker};
use crate::embed::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use crate::extract::TextExtractor;
use crate::meta::MetadataStore;
use crate::models::{
    ChunkMetadata, DeduplicationRecord, DocumentChunk, DocumentMetadata, IndexingMode,
    IndexingStats, LibraryIndexMetadata, RunStatus, CHUNK_SCHEMA_VERSION,
};
use crate::store::{ChunkStore, DedupIndex};
use crate::zotero::{DocumentSource, Item, LibraryRef};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Progress callback: (items done, items total). Called once with (0, total)
/// before the first item and after every item; values never decrease.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send + Sync>;

/// One indexing run's inputs
pub struct IndexRequest {
    pub library: LibraryRef,
    pub library_name: String,
    pub mode: IndexingMode,
    /// Stop after this many items (diagnostic runs)
    pub max_items: Option<usize>,
    pub cancel: CancellationToken,
    pub progress: Option<ProgressFn>,
}

impl IndexRequest {
    pub fn new(library: LibraryRef, library_name: impl Into<String>) -> Self {
        Self {
            library,
            library_name: library_name.into(),
            mode: IndexingMode::Auto,
            max_items: None,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    fn report(&self, done: u64, total: u64) {
        if let Some(progress) = &self.progress {
            progress(done, total);
        }
    }
}

/// Resolve the requested mode against stored library state.
///
/// - No stored state: full, whatever was asked
/// - Force-reindex flag set: full (the flag is consumed when the run completes)
/// - Auto or incremental with a zero watermark: full, since there is nothing
///   to be incremental against
pub fn select_mode(requested: IndexingMode, stored: Option<&LibraryIndexMetadata>) -> IndexingMode {
    let Some(meta) = stored else {
        return IndexingMode::Full;
    };
    if meta.force_reindex {
        return IndexingMode::Full;
    }
    match requested {
        IndexingMode::Full => IndexingMode::Full,
        IndexingMode::Auto | IndexingMode::Incremental => {
            if meta.last_indexed_version > 0 {
                IndexingMode::Incremental
            } else {
                IndexingMode::Full
            }
        }
    }
}

/// Pipeline components behind trait seams so the whole flow is testable
/// without Zotero, Qdrant, or an embedding backend
pub struct Indexer {
    pub source: Arc<dyn DocumentSource>,
    pub extractor: Arc<dyn TextExtractor>,
    pub embedder: Arc<dyn Embedder>,
    pub chunks: Arc<dyn ChunkStore>,
    pub dedup: Arc<dyn DedupIndex>,
    pub meta: Arc<dyn MetadataStore>,
    pub chunker: TextChunker,
    pub embed_batch_size: usize,
    pub item_chunk_cap: usize,
}

impl Indexer {
    /// Run one indexing pass over a library.
    ///
    /// Returns `Err` only when the run cannot start at all (listing the
    /// library fails, metadata is unreadable, a full run's initial wipe
    /// fails). Per-item work after that is recovered and reported through
    /// the stats.
    #[instrument(skip(self, request), fields(library = %request.library.id))]
    pub async fn index_library(&self, request: &IndexRequest) -> Result<IndexingStats> {
        let started = Instant::now();

        let stored = self.meta.get_library(&request.library.id).await?;
        let mode = select_mode(request.mode, stored.as_ref());
        let force_was_set = stored.as_ref().map(|m| m.force_reindex).unwrap_or(false);
        let watermark = stored.as_ref().map(|m| m.last_indexed_version).unwrap_or(0);

        let since = match mode {
            IndexingMode::Incremental => Some(watermark),
            _ => None,
        };

        info!(
            "Indexing library {} ({}) in {} mode{}",
            request.library.id,
            request.library_name,
            mode,
            since.map(|v| format!(", since version {}", v)).unwrap_or_default()
        );

        let listing = self.source.list_items_since(&request.library, since).await?;

        let mut stats = IndexingStats::new(mode);

        // A full run rebuilds the library from nothing: prior chunks and
        // dedup records go before any item is processed
        if mode == IndexingMode::Full {
            let wiped = self.chunks.delete_library_chunks(&request.library.id).await?;
            stats.chunks_deleted += wiped;
            self.dedup.delete_library_records(&request.library.id).await?;
        }

        // Only items with at least one PDF attachment are indexed or counted
        let mut work: Vec<(Item, Vec<Item>)> = Vec::new();
        for item in listing.items {
            let children = match self.source.list_children(&request.library, &item.key).await {
                Ok(children) => children,
                Err(e) => {
                    warn!("Listing attachments of {} failed: {}", item.key, e);
                    stats.errors += 1;
                    continue;
                }
            };
            let pdfs: Vec<Item> = children
                .into_iter()
                .filter(|c| c.is_pdf_attachment())
                .collect();
            if !pdfs.is_empty() {
                work.push((item, pdfs));
            }
        }
        if let Some(max) = request.max_items {
            work.truncate(max);
        }
        let total = work.len() as u64;

        request.report(0, total);

        for (i, (item, pdfs)) in work.iter().enumerate() {
            if request.cancel.is_cancelled() {
                info!("Indexing cancelled after {} item(s)", i);
                stats.status = RunStatus::Cancelled;
                break;
            }

            match self.process_item(request, item, pdfs, mode, &mut stats).await {
                Ok(()) => {}
                Err(e) => {
                    warn!("Item {} failed: {}", item.key, e);
                    stats.errors += 1;
                }
            }

            stats.items_processed += 1;
            request.report(stats.items_processed, total);
        }

        if stats.status == RunStatus::Running {
            stats.status = if request.cancel.is_cancelled() {
                RunStatus::Cancelled
            } else {
                RunStatus::Completed
            };
        }

        // The watermark only advances when the run ran to completion, so an
        // interrupted run re-examines the same delta next time
        let new_watermark = if stats.status == RunStatus::Completed {
            watermark.max(listing.library_version)
        } else {
            watermark
        };
        stats.last_version = new_watermark;
        stats.elapsed_seconds = started.elapsed().as_secs_f64();

        self.record_run(request, stored, &stats, new_watermark, force_was_set)
            .await?;

        info!(
            "Indexing {}: {} item(s), +{} chunks, -{} chunks, {} error(s) in {:.1}s",
            stats.status,
            stats.items_processed,
            stats.chunks_added,
            stats.chunks_deleted,
            stats.errors,
            stats.elapsed_seconds
        );

        Ok(stats)
    }

    /// Reindex one item. Incremental runs compare the stored chunk version
    /// against the fetched one and skip items that have not moved; full runs
    /// reprocess unconditionally, since the library was wiped up front.
    async fn process_item(
        &self,
        request: &IndexRequest,
        item: &Item,
        pdfs: &[Item],
        mode: IndexingMode,
        stats: &mut IndexingStats,
    ) -> Result<()> {
        let library = &request.library;

        let stored_version = if mode == IndexingMode::Full {
            None
        } else {
            self.chunks.item_version(&library.id, &item.key).await?
        };

        if let Some(stored) = stored_version {
            if stored >= item.version {
                debug!(
                    "Item {} unchanged (stored v{}, fetched v{})",
                    item.key, stored, item.version
                );
                return Ok(());
            }
        }

        // Stale (or legacy untracked) chunks go first so a failure below
        // leaves the item absent rather than duplicated
        if mode != IndexingMode::Full {
            let deleted = self.chunks.delete_item_chunks(&library.id, &item.key).await?;
            stats.chunks_deleted += deleted;
        }

        for attachment in pdfs {
            self.process_attachment(request, item, attachment, stats).await?;
        }

        // Counted only once every attachment has landed; a failed item goes
        // into the error tally instead
        if stored_version.is_some() {
            stats.items_updated += 1;
        } else {
            stats.items_added += 1;
        }

        Ok(())
    }

    async fn process_attachment(
        &self,
        request: &IndexRequest,
        item: &Item,
        attachment: &Item,
        stats: &mut IndexingStats,
    ) -> Result<()> {
        let library = &request.library;
        let Some(bytes) = self.source.fetch_attachment(library, &attachment.key).await? else {
            debug!("Attachment {} has no local file, skipping", attachment.key);
            return Ok(());
        };
        let content_hash = compute_content_hash(&bytes);

        // Identical file content already indexed under another item gets
        // skipped; a re-run over the same item proceeds so updates land
        if let Some(existing) = self.dedup.find(&content_hash).await? {
            if existing.item_key != item.key || existing.library_id != library.id {
                debug!(
                    "Attachment {} duplicates content of {}:{}, skipping",
                    attachment.key, existing.library_id, existing.item_key
                );
                return Ok(());
            }
        }

        let pages = self.extractor.extract(bytes).await?;
        let page_texts: Vec<(i32, String)> =
            pages.into_iter().map(|p| (p.page_number, p.text)).collect();

        let mut text_chunks = self.chunker.chunk_pages(&page_texts);
        if text_chunks.len() > self.item_chunk_cap {
            warn!(
                "Item {} produced {} chunks, capping at {}",
                item.key,
                text_chunks.len(),
                self.item_chunk_cap
            );
            stats.chunks_skipped += (text_chunks.len() - self.item_chunk_cap) as u64;
            text_chunks.truncate(self.item_chunk_cap);
        }

        if text_chunks.is_empty() {
            debug!("Attachment {} has no extractable text", attachment.key);
            return Ok(());
        }

        let texts: Vec<String> = text_chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_in_batches(self.embedder.as_ref(), &texts, self.embed_batch_size)
            .await
            .map_err(|e| Error::Embedding(format!("item {}: {}", item.key, e)))?;

        let indexed_at = Utc::now().to_rfc3339();
        let document = DocumentMetadata {
            library_id: library.id.clone(),
            item_key: item.key.clone(),
            title: item.data.title.clone(),
            authors: item.authors(),
            year: item.year(),
            item_type: Some(item.data.item_type.clone()),
            attachment_key: Some(attachment.key.clone()),
        };

        let chunks: Vec<DocumentChunk> = text_chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| DocumentChunk {
                metadata: ChunkMetadata {
                    chunk_id: ChunkMetadata::chunk_id(
                        &library.id,
                        &item.key,
                        &attachment.key,
                        chunk.index,
                    ),
                    document: document.clone(),
                    page_number: chunk.page_number,
                    text_preview: chunk.text_preview(),
                    chunk_index: chunk.index,
                    content_hash: chunk.content_hash(),
                    item_version: item.version,
                    attachment_version: attachment.version,
                    indexed_at: indexed_at.clone(),
                    source_modified: item.data.date_modified.clone().unwrap_or_default(),
                    schema_version: CHUNK_SCHEMA_VERSION,
                },
                text: chunk.text,
                embedding: Some(vector),
            })
            .collect();

        let added = match self.chunks.add_chunks(&chunks).await {
            Ok(added) => added,
            Err(Error::Validation(msg)) => {
                warn!("Attachment {} rejected by the store: {}", attachment.key, msg);
                stats.chunks_skipped += chunks.len() as u64;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        stats.chunks_added += added;

        self.dedup
            .record(&DeduplicationRecord {
                content_hash,
                library_id: library.id.clone(),
                item_key: item.key.clone(),
                relation_uri: item.same_as_relation(),
            })
            .await?;

        Ok(())
    }

    /// Persist post-run library state
    async fn record_run(
        &self,
        request: &IndexRequest,
        stored: Option<LibraryIndexMetadata>,
        stats: &IndexingStats,
        new_watermark: i64,
        force_was_set: bool,
    ) -> Result<()> {
        let mut meta = stored.unwrap_or_else(|| {
            LibraryIndexMetadata::new(
                &request.library.id,
                request.library.kind,
                &request.library_name,
            )
        });

        meta.library_name = request.library_name.clone();
        meta.last_indexed_version = new_watermark;
        meta.last_indexed_at = Utc::now().to_rfc3339();
        // A full run rebuilt the library, so the processed count is the new
        // total; an incremental run only grows it by the new items
        meta.total_items_indexed = match stats.mode {
            IndexingMode::Full => stats.items_processed as i64,
            _ => meta.total_items_indexed + stats.items_added as i64,
        };
        meta.indexing_mode = stats.mode;
        meta.total_chunks = self
            .chunks
            .count_library_chunks(&request.library.id)
            .await? as i64;

        // Consume the force flag only once the forced run has completed
        if force_was_set && stats.status == RunStatus::Completed {
            meta.force_reindex = false;
        }

        self.meta.upsert_library(&meta).await
    }
}
