//! Record shapes shared across the indexing pipeline.
//!
//! These mirror what is persisted in Qdrant (chunks, dedup records) and
//! SQLite (library metadata), plus the statistics object returned by every
//! indexing run.

use crate::error::Error;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Schema version stamped on chunk payloads. Version 1 payloads predate the
/// item/attachment version fields.
pub const CHUNK_SCHEMA_VERSION: i64 = 2;

/// Schema version for library metadata rows.
pub const LIBRARY_SCHEMA_VERSION: i64 = 1;

/// Library kinds as exposed by the Zotero API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    User,
    Group,
}

impl std::fmt::Display for LibraryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryKind::User => write!(f, "user"),
            LibraryKind::Group => write!(f, "group"),
        }
    }
}

impl FromStr for LibraryKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_lowercase().as_str() {
            "user" => Ok(LibraryKind::User),
            "group" => Ok(LibraryKind::Group),
            _ => Err(Error::Config(format!("Unknown library kind: {}", s))),
        }
    }
}

/// Indexing mode requested by the caller or recorded after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingMode {
    Auto,
    Incremental,
    Full,
}

impl std::fmt::Display for IndexingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexingMode::Auto => write!(f, "auto"),
            IndexingMode::Incremental => write!(f, "incremental"),
            IndexingMode::Full => write!(f, "full"),
        }
    }
}

impl FromStr for IndexingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(IndexingMode::Auto),
            "incremental" => Ok(IndexingMode::Incremental),
            "full" => Ok(IndexingMode::Full),
            _ => Err(Error::Config(format!("Unknown indexing mode: {}", s))),
        }
    }
}

/// Status of an indexing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Error => write!(f, "error"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "error" => Ok(RunStatus::Error),
            "cancelled" => Ok(RunStatus::Cancelled),
            _ => Err(Error::Config(format!("Unknown run status: {}", s))),
        }
    }
}

/// Per-library indexing state. One row per library, created on first index,
/// mutated at the end of every run, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryIndexMetadata {
    pub library_id: String,
    pub library_kind: LibraryKind,
    pub library_name: String,

    /// Highest Zotero version number fully processed. Never decreases.
    pub last_indexed_version: i64,
    pub last_indexed_at: String,

    pub total_items_indexed: i64,
    pub total_chunks: i64,

    /// Last mode actually executed
    pub indexing_mode: IndexingMode,

    /// Hard reset flag: forces the next run to full mode, consumed once
    pub force_reindex: bool,

    pub schema_version: i64,
}

impl LibraryIndexMetadata {
    pub fn new(library_id: &str, library_kind: LibraryKind, library_name: &str) -> Self {
        Self {
            library_id: library_id.to_string(),
            library_kind,
            library_name: library_name.to_string(),
            last_indexed_version: 0,
            last_indexed_at: Utc::now().to_rfc3339(),
            total_items_indexed: 0,
            total_chunks: 0,
            indexing_mode: IndexingMode::Full,
            force_reindex: false,
            schema_version: LIBRARY_SCHEMA_VERSION,
        }
    }
}

/// Metadata for a source document (Zotero item)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub library_id: String,
    pub item_key: String,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub item_type: Option<String>,
    pub attachment_key: Option<String>,
}

/// Metadata for one chunk of one attachment, with version tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Deterministic id: `{library_id}:{item_key}:{attachment_key}:{ordinal}`
    pub chunk_id: String,
    pub document: DocumentMetadata,
    pub page_number: Option<i32>,
    /// First five words of the chunk text, used as a citation anchor
    pub text_preview: String,
    pub chunk_index: i64,
    pub content_hash: String,

    /// Zotero item version at indexing time
    pub item_version: i64,
    /// Zotero attachment version at indexing time
    pub attachment_version: i64,
    pub indexed_at: String,
    /// The item's dateModified field from Zotero
    pub source_modified: String,

    pub schema_version: i64,
}

impl ChunkMetadata {
    pub fn chunk_id(library_id: &str, item_key: &str, attachment_key: &str, ordinal: i64) -> String {
        format!("{}:{}:{}:{}", library_id, item_key, attachment_key, ordinal)
    }
}

/// A chunk of text with metadata and (once embedded) its vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Option<Vec<f32>>,
}

/// Maps an attachment's content hash to the library/item that first produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeduplicationRecord {
    pub content_hash: String,
    pub library_id: String,
    pub item_key: String,
    /// owl:sameAs relation URI if present
    pub relation_uri: Option<String>,
}

/// Statistics returned by every indexing run. The `status` field is the
/// single source of truth for success/failure/cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingStats {
    /// Mode actually executed (never `auto`)
    pub mode: IndexingMode,
    pub status: RunStatus,
    pub items_processed: u64,
    pub items_added: u64,
    pub items_updated: u64,
    pub chunks_added: u64,
    pub chunks_deleted: u64,
    /// Chunks not written: over the per-item cap or rejected by the store
    pub chunks_skipped: u64,
    /// Item-scoped failures recovered during the run
    pub errors: u64,
    pub last_version: i64,
    pub elapsed_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IndexingStats {
    pub fn new(mode: IndexingMode) -> Self {
        Self {
            mode,
            status: RunStatus::Running,
            items_processed: 0,
            items_added: 0,
            items_updated: 0,
            chunks_added: 0,
            chunks_deleted: 0,
            chunks_skipped: 0,
            errors: 0,
            last_version: 0,
            elapsed_seconds: 0.0,
            error: None,
        }
    }
}
