//! SQLite-backed library indexing metadata
//!
//! One row per library: the indexing watermark, run bookkeeping, and the
//! force-reindex flag. Rows are created on first index and mutated at the
//! end of every run; they are never deleted by normal operation.

use crate::error::Result;
use crate::models::{IndexingMode, LibraryIndexMetadata, LibraryKind};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Read/write access to per-library indexing state
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch one library's state, `None` if it has never been indexed
    async fn get_library(&self, library_id: &str) -> Result<Option<LibraryIndexMetadata>>;

    /// Insert or replace a library's state
    async fn upsert_library(&self, meta: &LibraryIndexMetadata) -> Result<()>;

    /// Set the force-reindex flag, creating a placeholder row when the
    /// library has never been indexed
    async fn mark_for_reset(&self, library_id: &str) -> Result<()>;

    /// All known libraries, ordered by id
    async fn list_libraries(&self) -> Result<Vec<LibraryIndexMetadata>>;

    /// Remove a library's state entirely. Returns false when unknown.
    async fn delete_library(&self, library_id: &str) -> Result<bool>;
}

/// SQLite implementation of [`MetadataStore`]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Open (creating if needed) the metadata database at the given path
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        debug!("Opening metadata db at {:?}", path);

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// In-memory database for tests
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS libraries (
                library_id TEXT PRIMARY KEY,
                library_kind TEXT NOT NULL,
                library_name TEXT NOT NULL,
                last_indexed_version INTEGER NOT NULL DEFAULT 0,
                last_indexed_at TEXT NOT NULL,
                total_items_indexed INTEGER NOT NULL DEFAULT 0,
                total_chunks INTEGER NOT NULL DEFAULT 0,
                indexing_mode TEXT NOT NULL,
                force_reindex INTEGER NOT NULL DEFAULT 0,
                schema_version INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_metadata(row: &sqlx::sqlite::SqliteRow) -> Result<LibraryIndexMetadata> {
        let kind_str: String = row.try_get("library_kind")?;
        let mode_str: String = row.try_get("indexing_mode")?;

        Ok(LibraryIndexMetadata {
            library_id: row.try_get("library_id")?,
            library_kind: LibraryKind::from_str(&kind_str)?,
            library_name: row.try_get("library_name")?,
            last_indexed_version: row.try_get("last_indexed_version")?,
            last_indexed_at: row.try_get("last_indexed_at")?,
            total_items_indexed: row.try_get("total_items_indexed")?,
            total_chunks: row.try_get("total_chunks")?,
            indexing_mode: IndexingMode::from_str(&mode_str)?,
            force_reindex: row.try_get::<i64, _>("force_reindex")? != 0,
            schema_version: row.try_get("schema_version")?,
        })
    }
}

#[async_trait]
impl MetadataStore for MetaDb {
    async fn get_library(&self, library_id: &str) -> Result<Option<LibraryIndexMetadata>> {
        let row = sqlx::query("SELECT * FROM libraries WHERE library_id = ?")
            .bind(library_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_metadata).transpose()
    }

    async fn upsert_library(&self, meta: &LibraryIndexMetadata) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO libraries (
                library_id, library_kind, library_name,
                last_indexed_version, last_indexed_at,
                total_items_indexed, total_chunks,
                indexing_mode, force_reindex, schema_version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(library_id) DO UPDATE SET
                library_kind = excluded.library_kind,
                library_name = excluded.library_name,
                last_indexed_version = excluded.last_indexed_version,
                last_indexed_at = excluded.last_indexed_at,
                total_items_indexed = excluded.total_items_indexed,
                total_chunks = excluded.total_chunks,
                indexing_mode = excluded.indexing_mode,
                force_reindex = excluded.force_reindex,
                schema_version = excluded.schema_version
            "#,
        )
        .bind(&meta.library_id)
        .bind(meta.library_kind.to_string())
        .bind(&meta.library_name)
        .bind(meta.last_indexed_version)
        .bind(&meta.last_indexed_at)
        .bind(meta.total_items_indexed)
        .bind(meta.total_chunks)
        .bind(meta.indexing_mode.to_string())
        .bind(meta.force_reindex as i64)
        .bind(meta.schema_version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_for_reset(&self, library_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE libraries SET force_reindex = 1 WHERE library_id = ?")
            .bind(library_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            let mut placeholder =
                LibraryIndexMetadata::new(library_id, LibraryKind::User, library_id);
            placeholder.force_reindex = true;
            self.upsert_library(&placeholder).await?;
        }

        Ok(())
    }

    async fn list_libraries(&self) -> Result<Vec<LibraryIndexMetadata>> {
        let rows = sqlx::query("SELECT * FROM libraries ORDER BY library_id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_metadata).collect()
    }

    async fn delete_library(&self, library_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM libraries WHERE library_id = ?")
            .bind(library_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
