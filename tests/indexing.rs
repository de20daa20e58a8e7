//! End-to-end tests for the indexing orchestrator against in-memory
//! implementations of the source, extractor, embedder, and stores.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use zotrag::chunk::TextChunker;
use zotrag::embed::Embedder;
use zotrag::error::{Error, Result};
use zotrag::extract::{PageText, TextExtractor};
use zotrag::index::{IndexRequest, Indexer};
use zotrag::meta::{MetaDb, MetadataStore};
use zotrag::models::{
    DeduplicationRecord, DocumentChunk, IndexingMode, LibraryKind, RunStatus,
};
use zotrag::store::{ChunkPayload, ChunkStore, DedupIndex};
use zotrag::zotero::{
    Creator, DocumentSource, Item, ItemData, ItemListing, LibraryInfo, LibraryRef,
};

// ---------------------------------------------------------------------------
// Fakes

fn make_item(key: &str, version: i64, title: &str) -> Item {
    Item {
        key: key.to_string(),
        version,
        data: ItemData {
            item_type: "journalArticle".to_string(),
            title: Some(title.to_string()),
            creators: vec![Creator {
                creator_type: Some("author".to_string()),
                first_name: Some("Ada".to_string()),
                last_name: Some("Lovelace".to_string()),
                name: None,
            }],
            date: Some("2021".to_string()),
            date_modified: Some("2021-06-01T00:00:00Z".to_string()),
            content_type: None,
            relations: serde_json::Value::Null,
        },
    }
}

fn make_pdf_attachment(key: &str, version: i64) -> Item {
    Item {
        key: key.to_string(),
        version,
        data: ItemData {
            item_type: "attachment".to_string(),
            content_type: Some("application/pdf".to_string()),
            ..Default::default()
        },
    }
}

type AttachmentEntry = (Item, Vec<u8>);

#[derive(Default)]
struct FakeSource {
    // item -> its attachments with raw bytes
    items: Mutex<Vec<(Item, Vec<AttachmentEntry>)>>,
    library_version: Mutex<i64>,
    fail_listing: AtomicBool,
    fail_fetch_for: Mutex<HashSet<String>>,
    missing_files: Mutex<HashSet<String>>,
}

impl FakeSource {
    fn add_item(&self, item: Item, attachments: Vec<AttachmentEntry>) {
        self.items.lock().unwrap().push((item, attachments));
    }

    fn set_library_version(&self, version: i64) {
        *self.library_version.lock().unwrap() = version;
    }

    fn bump_item(&self, key: &str, new_version: i64, new_content: &[u8]) {
        let mut items = self.items.lock().unwrap();
        for (item, attachments) in items.iter_mut() {
            if item.key == key {
                item.version = new_version;
                for (attachment, bytes) in attachments.iter_mut() {
                    attachment.version = new_version;
                    *bytes = new_content.to_vec();
                }
            }
        }
    }
}

#[async_trait]
impl DocumentSource for FakeSource {
    async fn check_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn list_libraries(&self) -> Result<Vec<LibraryInfo>> {
        Ok(vec![LibraryInfo {
            id: "1".to_string(),
            kind: LibraryKind::User,
            name: "Test Library".to_string(),
        }])
    }

    async fn list_items_since(
        &self,
        _library: &LibraryRef,
        since: Option<i64>,
    ) -> Result<ItemListing> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::Source("listing failed".to_string()));
        }

        let items = self
            .items
            .lock()
            .unwrap()
            .iter()
            .map(|(item, _)| item.clone())
            .filter(|item| since.map(|s| item.version > s).unwrap_or(true))
            .collect();

        Ok(ItemListing {
            items,
            library_version: *self.library_version.lock().unwrap(),
        })
    }

    async fn list_children(&self, _library: &LibraryRef, item_key: &str) -> Result<Vec<Item>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|(item, _)| item.key == item_key)
            .map(|(_, attachments)| attachments.iter().map(|(a, _)| a.clone()).collect())
            .unwrap_or_default())
    }

    async fn fetch_attachment(
        &self,
        _library: &LibraryRef,
        attachment_key: &str,
    ) -> Result<Option<Vec<u8>>> {
        if self.fail_fetch_for.lock().unwrap().contains(attachment_key) {
            return Err(Error::Source(format!("fetch of {} failed", attachment_key)));
        }
        if self.missing_files.lock().unwrap().contains(attachment_key) {
            return Ok(None);
        }

        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, attachments)| attachments.iter())
            .find(|(a, _)| a.key == attachment_key)
            .map(|(_, bytes)| bytes.clone()))
    }
}

/// Treats attachment bytes as UTF-8, form feeds separate pages
struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> Result<Vec<PageText>> {
        let text = String::from_utf8(bytes)
            .map_err(|e| Error::Extract(e.to_string()))?;
        Ok(text
            .split('\x0c')
            .enumerate()
            .filter(|(_, page)| !page.trim().is_empty())
            .map(|(i, page)| PageText {
                page_number: (i + 1) as i32,
                text: page.to_string(),
            })
            .collect())
    }
}

struct FakeEmbedder;

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![t.len() as f32; 4]).collect())
    }

    fn dimension(&self) -> usize {
        4
    }
}

#[derive(Default)]
struct InMemoryChunkStore {
    chunks: Mutex<HashMap<String, DocumentChunk>>,
    // items whose stored chunks predate version tracking
    legacy_items: Mutex<HashSet<String>>,
    reject_adds: AtomicBool,
}

impl InMemoryChunkStore {
    fn count_for_item(&self, item_key: &str) -> usize {
        self.chunks
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.metadata.document.item_key == item_key)
            .count()
    }

    fn total(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn add_chunks(&self, chunks: &[DocumentChunk]) -> Result<u64> {
        if self.reject_adds.load(Ordering::SeqCst) {
            return Err(Error::Validation("batch rejected".to_string()));
        }
        for chunk in chunks {
            if chunk.embedding.is_none() {
                return Err(Error::Validation(format!(
                    "chunk {} has no embedding",
                    chunk.metadata.chunk_id
                )));
            }
        }
        let mut store = self.chunks.lock().unwrap();
        for chunk in chunks {
            store.insert(chunk.metadata.chunk_id.clone(), chunk.clone());
        }
        Ok(chunks.len() as u64)
    }

    async fn get_item_chunks(
        &self,
        library_id: &str,
        item_key: &str,
        limit: usize,
    ) -> Result<Vec<ChunkPayload>> {
        let store = self.chunks.lock().unwrap();
        let mut payloads: Vec<ChunkPayload> = store
            .values()
            .filter(|c| {
                c.metadata.document.library_id == library_id
                    && c.metadata.document.item_key == item_key
            })
            .map(|c| ChunkPayload::from_chunk(&c.text, &c.metadata))
            .collect();
        payloads.sort_by_key(|p| p.chunk_index);
        payloads.truncate(limit);
        Ok(payloads)
    }

    async fn delete_item_chunks(&self, library_id: &str, item_key: &str) -> Result<u64> {
        let mut store = self.chunks.lock().unwrap();
        let before = store.len();
        store.retain(|_, c| {
            !(c.metadata.document.library_id == library_id
                && c.metadata.document.item_key == item_key)
        });
        Ok((before - store.len()) as u64)
    }

    async fn delete_library_chunks(&self, library_id: &str) -> Result<u64> {
        let mut store = self.chunks.lock().unwrap();
        let before = store.len();
        store.retain(|_, c| c.metadata.document.library_id != library_id);
        Ok((before - store.len()) as u64)
    }

    async fn item_version(&self, library_id: &str, item_key: &str) -> Result<Option<i64>> {
        if self.legacy_items.lock().unwrap().contains(item_key) {
            return Ok(None);
        }
        Ok(self
            .chunks
            .lock()
            .unwrap()
            .values()
            .filter(|c| {
                c.metadata.document.library_id == library_id
                    && c.metadata.document.item_key == item_key
            })
            .map(|c| c.metadata.item_version)
            .max())
    }

    async fn count_library_chunks(&self, library_id: &str) -> Result<u64> {
        Ok(self
            .chunks
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.metadata.document.library_id == library_id)
            .count() as u64)
    }
}

#[derive(Default)]
struct InMemoryDedup {
    records: Mutex<HashMap<String, DeduplicationRecord>>,
}

#[async_trait]
impl DedupIndex for InMemoryDedup {
    async fn find(&self, content_hash: &str) -> Result<Option<DeduplicationRecord>> {
        Ok(self.records.lock().unwrap().get(content_hash).cloned())
    }

    async fn record(&self, record: &DeduplicationRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .entry(record.content_hash.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn delete_library_records(&self, library_id: &str) -> Result<u64> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, r| r.library_id != library_id);
        Ok((before - records.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Harness

struct Harness {
    source: Arc<FakeSource>,
    chunks: Arc<InMemoryChunkStore>,
    dedup: Arc<InMemoryDedup>,
    meta: Arc<MetaDb>,
    indexer: Indexer,
}

async fn harness() -> Harness {
    let source = Arc::new(FakeSource::default());
    let chunks = Arc::new(InMemoryChunkStore::default());
    let dedup = Arc::new(InMemoryDedup::default());
    let meta = Arc::new(MetaDb::open_in_memory().await.unwrap());

    let indexer = Indexer {
        source: source.clone(),
        extractor: Arc::new(PlainTextExtractor),
        embedder: Arc::new(FakeEmbedder),
        chunks: chunks.clone(),
        dedup: dedup.clone(),
        meta: meta.clone(),
        chunker: TextChunker::new(120, 40),
        embed_batch_size: 8,
        item_chunk_cap: 10_000,
    };

    Harness {
        source,
        chunks,
        dedup,
        meta,
        indexer,
    }
}

fn request() -> IndexRequest {
    IndexRequest::new(LibraryRef::new("1", LibraryKind::User), "Test Library")
}

fn long_text(tag: &str) -> Vec<u8> {
    format!(
        "{tag} begins here with an opening sentence. The quick brown fox jumps over \
         the lazy dog every single day. Another sentence keeps the chunker busy for \
         a while longer. A final thought closes out page one.\x0cPage two of {tag} \
         opens with fresh material. More sentences follow to force several chunks. \
         The end arrives eventually."
    )
    .into_bytes()
}

// ---------------------------------------------------------------------------
// Tests

#[tokio::test]
async fn first_run_is_full_and_indexes_everything() {
    let h = harness().await;
    for i in 0..3 {
        let key = format!("ITEM{}", i);
        h.source.add_item(
            make_item(&key, 10 + i, &format!("Paper {}", i)),
            vec![(
                make_pdf_attachment(&format!("ATT{}", i), 10 + i),
                long_text(&key),
            )],
        );
    }
    h.source.set_library_version(13);

    let progress: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let mut req = request();
    let progress_clone = progress.clone();
    req.progress = Some(Box::new(move |done, total| {
        progress_clone.lock().unwrap().push((done, total));
    }));

    let stats = h.indexer.index_library(&req).await.unwrap();

    assert_eq!(stats.mode, IndexingMode::Full);
    assert_eq!(stats.status, RunStatus::Completed);
    assert_eq!(stats.items_processed, 3);
    assert_eq!(stats.items_added, 3);
    assert_eq!(stats.items_updated, 0);
    assert_eq!(stats.errors, 0);
    assert!(stats.chunks_added > 3);
    assert_eq!(stats.last_version, 13);
    assert_eq!(h.chunks.total() as u64, stats.chunks_added);

    // Progress starts at (0, 3), ends at (3, 3), never decreases
    let reports = progress.lock().unwrap();
    assert_eq!(reports.first(), Some(&(0, 3)));
    assert_eq!(reports.last(), Some(&(3, 3)));
    for pair in reports.windows(2) {
        assert!(pair[1].0 >= pair[0].0);
        assert_eq!(pair[1].1, pair[0].1);
    }

    // Watermark and totals persisted
    let meta = h.meta.get_library("1").await.unwrap().unwrap();
    assert_eq!(meta.last_indexed_version, 13);
    assert_eq!(meta.total_items_indexed, 3);
    assert_eq!(meta.total_chunks as u64, stats.chunks_added);
}

#[tokio::test]
async fn rerun_with_no_changes_is_an_incremental_noop() {
    let h = harness().await;
    h.source.add_item(
        make_item("ITEM0", 10, "Paper"),
        vec![(make_pdf_attachment("ATT0", 10), long_text("ITEM0"))],
    );
    h.source.set_library_version(10);

    let first = h.indexer.index_library(&request()).await.unwrap();
    let before = h.chunks.total();

    let second = h.indexer.index_library(&request()).await.unwrap();

    assert_eq!(second.mode, IndexingMode::Incremental);
    assert_eq!(second.items_processed, 0);
    assert_eq!(second.chunks_added, 0);
    assert_eq!(second.chunks_deleted, 0);
    assert_eq!(h.chunks.total(), before);

    // Watermark never decreases
    assert!(second.last_version >= first.last_version);
}

#[tokio::test]
async fn version_bump_deletes_then_reinserts() {
    let h = harness().await;
    h.source.add_item(
        make_item("ITEM0", 10, "Paper"),
        vec![(make_pdf_attachment("ATT0", 10), long_text("original"))],
    );
    h.source.set_library_version(10);

    h.indexer.index_library(&request()).await.unwrap();
    let old_count = h.chunks.count_for_item("ITEM0");
    assert!(old_count > 0);

    // Item modified in Zotero: version bumps, content changes
    h.source
        .bump_item("ITEM0", 11, &long_text("revised edition"));
    h.source.set_library_version(11);

    let stats = h.indexer.index_library(&request()).await.unwrap();

    assert_eq!(stats.mode, IndexingMode::Incremental);
    assert_eq!(stats.items_updated, 1);
    assert_eq!(stats.items_added, 0);
    assert_eq!(stats.chunks_deleted as usize, old_count);
    assert!(stats.chunks_added > 0);
    assert_eq!(h.chunks.count_for_item("ITEM0") as u64, stats.chunks_added);

    // All surviving payloads carry the new version, in ordinal order
    let payloads = h.chunks.get_item_chunks("1", "ITEM0", 100).await.unwrap();
    assert_eq!(payloads.len() as u64, stats.chunks_added);
    for (i, payload) in payloads.iter().enumerate() {
        assert_eq!(payload.item_version, 11);
        assert_eq!(payload.chunk_index, i as i64);
    }
}

#[tokio::test]
async fn full_mode_wipes_and_rebuilds_unchanged_items() {
    let h = harness().await;
    h.source.add_item(
        make_item("ITEM0", 10, "Paper"),
        vec![(make_pdf_attachment("ATT0", 10), long_text("ITEM0"))],
    );
    h.source.set_library_version(10);

    h.indexer.index_library(&request()).await.unwrap();
    let stored = h.chunks.count_for_item("ITEM0");
    assert!(stored > 0);

    // An explicit full run rebuilds from nothing, even with no source change
    let mut req = request();
    req.mode = IndexingMode::Full;
    let stats = h.indexer.index_library(&req).await.unwrap();

    assert_eq!(stats.mode, IndexingMode::Full);
    assert_eq!(stats.items_processed, 1);
    assert_eq!(stats.items_added, 1);
    assert_eq!(stats.items_updated, 0);
    assert_eq!(stats.chunks_deleted as usize, stored);
    assert_eq!(stats.chunks_added as usize, stored);
    assert_eq!(h.chunks.count_for_item("ITEM0"), stored);

    // Dedup records were wiped with the library and re-recorded
    assert_eq!(h.dedup.records.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn new_item_is_picked_up_incrementally() {
    let h = harness().await;
    h.source.add_item(
        make_item("ITEM0", 10, "Paper"),
        vec![(make_pdf_attachment("ATT0", 10), long_text("ITEM0"))],
    );
    h.source.set_library_version(10);
    h.indexer.index_library(&request()).await.unwrap();

    h.source.add_item(
        make_item("ITEM1", 15, "Newer Paper"),
        vec![(make_pdf_attachment("ATT1", 15), long_text("ITEM1"))],
    );
    h.source.set_library_version(15);

    let stats = h.indexer.index_library(&request()).await.unwrap();

    assert_eq!(stats.mode, IndexingMode::Incremental);
    assert_eq!(stats.items_processed, 1);
    assert_eq!(stats.items_added, 1);
    assert!(h.chunks.count_for_item("ITEM1") > 0);
    assert_eq!(stats.last_version, 15);
}

#[tokio::test]
async fn duplicate_content_is_indexed_once() {
    let h = harness().await;
    let shared = long_text("shared manuscript");
    h.source.add_item(
        make_item("ITEM0", 10, "Original"),
        vec![(make_pdf_attachment("ATT0", 10), shared.clone())],
    );
    h.source.add_item(
        make_item("ITEM1", 11, "Duplicate upload"),
        vec![(make_pdf_attachment("ATT1", 11), shared)],
    );
    h.source.set_library_version(11);

    let stats = h.indexer.index_library(&request()).await.unwrap();

    assert_eq!(stats.items_processed, 2);
    assert!(h.chunks.count_for_item("ITEM0") > 0);
    assert_eq!(h.chunks.count_for_item("ITEM1"), 0);

    // The dedup record names the first owner
    let records = h.dedup.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records.values().all(|r| r.item_key == "ITEM0"));
}

#[tokio::test]
async fn reindexing_the_same_item_is_not_blocked_by_its_own_dedup_record() {
    let h = harness().await;
    h.source.add_item(
        make_item("ITEM0", 10, "Paper"),
        vec![(make_pdf_attachment("ATT0", 10), long_text("stable content"))],
    );
    h.source.set_library_version(10);
    h.indexer.index_library(&request()).await.unwrap();

    // Version bumps but the attachment bytes are identical
    {
        let mut items = h.source.items.lock().unwrap();
        items[0].0.version = 11;
        items[0].1[0].0.version = 11;
    }
    h.source.set_library_version(11);

    let stats = h.indexer.index_library(&request()).await.unwrap();

    assert_eq!(stats.items_updated, 1);
    assert!(stats.chunks_added > 0);
    assert!(h.chunks.count_for_item("ITEM0") > 0);
}

#[tokio::test]
async fn cancellation_stops_between_items_and_keeps_watermark() {
    let h = harness().await;
    for i in 0..3 {
        let key = format!("ITEM{}", i);
        h.source.add_item(
            make_item(&key, 10, &format!("Paper {}", i)),
            vec![(
                make_pdf_attachment(&format!("ATT{}", i), 10),
                long_text(&key),
            )],
        );
    }
    h.source.set_library_version(10);

    let cancel = CancellationToken::new();
    let mut req = request();
    req.cancel = cancel.clone();
    let cancel_clone = cancel.clone();
    req.progress = Some(Box::new(move |done, _total| {
        if done == 1 {
            cancel_clone.cancel();
        }
    }));

    let stats = h.indexer.index_library(&req).await.unwrap();

    assert_eq!(stats.status, RunStatus::Cancelled);
    assert_eq!(stats.items_processed, 1);

    // An interrupted run must not advance the watermark
    let meta = h.meta.get_library("1").await.unwrap().unwrap();
    assert_eq!(meta.last_indexed_version, 0);

    // The next run is still full and finishes the job
    let stats = h.indexer.index_library(&request()).await.unwrap();
    assert_eq!(stats.mode, IndexingMode::Full);
    assert_eq!(stats.status, RunStatus::Completed);
    assert_eq!(stats.last_version, 10);
    assert!(h.chunks.count_for_item("ITEM2") > 0);
}

#[tokio::test]
async fn item_failure_is_recovered_and_run_completes() {
    let h = harness().await;
    h.source.add_item(
        make_item("GOOD1", 10, "Good"),
        vec![(make_pdf_attachment("ATTG1", 10), long_text("GOOD1"))],
    );
    h.source.add_item(
        make_item("BAD", 11, "Bad"),
        vec![(make_pdf_attachment("ATTB", 11), long_text("BAD"))],
    );
    h.source.add_item(
        make_item("GOOD2", 12, "Also Good"),
        vec![(make_pdf_attachment("ATTG2", 12), long_text("GOOD2"))],
    );
    h.source
        .fail_fetch_for
        .lock()
        .unwrap()
        .insert("ATTB".to_string());
    h.source.set_library_version(12);

    let stats = h.indexer.index_library(&request()).await.unwrap();

    assert_eq!(stats.status, RunStatus::Completed);
    assert_eq!(stats.items_processed, 3);
    assert_eq!(stats.errors, 1);
    // The failed item is an error, not an add
    assert_eq!(stats.items_added, 2);
    assert!(h.chunks.count_for_item("GOOD1") > 0);
    assert_eq!(h.chunks.count_for_item("BAD"), 0);
    assert!(h.chunks.count_for_item("GOOD2") > 0);
}

#[tokio::test]
async fn items_without_pdf_attachments_are_not_counted() {
    let h = harness().await;
    h.source.add_item(
        make_item("WITHPDF", 10, "Has a PDF"),
        vec![(make_pdf_attachment("ATT0", 10), long_text("WITHPDF"))],
    );
    h.source.add_item(make_item("NOTES", 11, "Notes only"), vec![]);
    h.source.set_library_version(11);

    let progress: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let mut req = request();
    let progress_clone = progress.clone();
    req.progress = Some(Box::new(move |done, total| {
        progress_clone.lock().unwrap().push((done, total));
    }));

    let stats = h.indexer.index_library(&req).await.unwrap();

    // The PDF-less item appears nowhere: not processed, not added,
    // not in the progress total
    assert_eq!(stats.items_processed, 1);
    assert_eq!(stats.items_added, 1);
    assert_eq!(progress.lock().unwrap().first(), Some(&(0, 1)));

    let meta = h.meta.get_library("1").await.unwrap().unwrap();
    assert_eq!(meta.total_items_indexed, 1);
}

#[tokio::test]
async fn rejected_batch_counts_as_skipped_chunks() {
    let h = harness().await;
    h.source.add_item(
        make_item("ITEM0", 10, "Paper"),
        vec![(make_pdf_attachment("ATT0", 10), long_text("ITEM0"))],
    );
    h.source.set_library_version(10);
    h.chunks.reject_adds.store(true, Ordering::SeqCst);

    let stats = h.indexer.index_library(&request()).await.unwrap();

    assert_eq!(stats.status, RunStatus::Completed);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.chunks_added, 0);
    assert!(stats.chunks_skipped > 0);
    assert_eq!(h.chunks.total(), 0);
}

#[tokio::test]
async fn attachment_without_local_file_is_skipped_without_error() {
    let h = harness().await;
    h.source.add_item(
        make_item("ITEM0", 10, "Linked attachment only"),
        vec![(make_pdf_attachment("ATT0", 10), long_text("ITEM0"))],
    );
    h.source
        .missing_files
        .lock()
        .unwrap()
        .insert("ATT0".to_string());
    h.source.set_library_version(10);

    let stats = h.indexer.index_library(&request()).await.unwrap();

    // No file on disk is not a failure, the item just yields no chunks
    assert_eq!(stats.status, RunStatus::Completed);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.items_processed, 1);
    assert_eq!(h.chunks.count_for_item("ITEM0"), 0);
}

#[tokio::test]
async fn listing_failure_is_fatal() {
    let h = harness().await;
    h.source.fail_listing.store(true, Ordering::SeqCst);

    let result = h.indexer.index_library(&request()).await;
    assert!(matches!(result, Err(Error::Source(_))));

    // Nothing was recorded for the library
    assert!(h.meta.get_library("1").await.unwrap().is_none());
}

#[tokio::test]
async fn force_reindex_flag_is_consumed_once() {
    let h = harness().await;
    h.source.add_item(
        make_item("ITEM0", 10, "Paper"),
        vec![(make_pdf_attachment("ATT0", 10), long_text("ITEM0"))],
    );
    h.source.set_library_version(10);
    h.indexer.index_library(&request()).await.unwrap();

    let stored = h.chunks.count_for_item("ITEM0");
    h.meta.mark_for_reset("1").await.unwrap();

    // Flagged: the run goes full despite a valid watermark, wiping the
    // library and re-embedding everything
    let stats = h.indexer.index_library(&request()).await.unwrap();
    assert_eq!(stats.mode, IndexingMode::Full);
    assert_eq!(stats.chunks_deleted as usize, stored);
    assert_eq!(stats.chunks_added as usize, stored);

    // Flag consumed: the next run is incremental again
    let meta = h.meta.get_library("1").await.unwrap().unwrap();
    assert!(!meta.force_reindex);
    let stats = h.indexer.index_library(&request()).await.unwrap();
    assert_eq!(stats.mode, IndexingMode::Incremental);
}

#[tokio::test]
async fn legacy_chunks_without_version_are_reindexed() {
    let h = harness().await;
    h.source.add_item(
        make_item("ITEM0", 10, "Paper"),
        vec![(make_pdf_attachment("ATT0", 10), long_text("ITEM0"))],
    );
    h.source.set_library_version(10);
    h.indexer.index_library(&request()).await.unwrap();
    let stored = h.chunks.count_for_item("ITEM0");

    // Simulate pre-version-tracking chunks: version lookup yields nothing
    h.legacy("ITEM0");
    h.source.bump_item("ITEM0", 11, &long_text("ITEM0 revised"));
    h.source.set_library_version(11);

    let stats = h.indexer.index_library(&request()).await.unwrap();

    // Old chunks replaced wholesale, counted as an add since no version
    // was recorded
    assert_eq!(stats.mode, IndexingMode::Incremental);
    assert_eq!(stats.chunks_deleted as usize, stored);
    assert!(stats.chunks_added > 0);
    assert_eq!(stats.items_added, 1);
    assert_eq!(stats.items_updated, 0);
}

#[tokio::test]
async fn max_items_limits_the_run() {
    let h = harness().await;
    for i in 0..5 {
        let key = format!("ITEM{}", i);
        h.source.add_item(
            make_item(&key, 10, &format!("Paper {}", i)),
            vec![(
                make_pdf_attachment(&format!("ATT{}", i), 10),
                long_text(&key),
            )],
        );
    }
    h.source.set_library_version(10);

    let mut req = request();
    req.max_items = Some(2);
    let stats = h.indexer.index_library(&req).await.unwrap();

    assert_eq!(stats.items_processed, 2);
}

impl Harness {
    fn legacy(&self, item_key: &str) {
        self.chunks
            .legacy_items
            .lock()
            .unwrap()
            .insert(item_key.to_string());
    }
}
