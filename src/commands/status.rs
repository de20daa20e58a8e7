//! Status command - summarize indexing state

use crate::config::Config;
use crate::error::Result;
use crate::meta::{MetaDb, MetadataStore};
use crate::models::LibraryIndexMetadata;
use crate::store::VectorStore;
use serde::Serialize;

/// System status summary
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub zotero_url: String,
    pub qdrant_url: String,
    pub embedding_model: String,
    pub total_chunks: u64,
    pub libraries: Vec<LibraryIndexMetadata>,
}

/// Gather status from the metadata database and Qdrant
pub async fn cmd_status(config: &Config, db: &MetaDb) -> Result<SystemStatus> {
    let store = VectorStore::connect(config).await?;
    let total_chunks = store.count_all_chunks().await?;
    let libraries = db.list_libraries().await?;

    Ok(SystemStatus {
        zotero_url: config.zotero.base_url.clone(),
        qdrant_url: config.qdrant_url.clone(),
        embedding_model: config.embedding.model.clone(),
        total_chunks,
        libraries,
    })
}

/// Print status to console
pub fn print_status(status: &SystemStatus) {
    println!("\nzotrag status\n");
    println!("Zotero:    {}", status.zotero_url);
    println!("Qdrant:    {}", status.qdrant_url);
    println!("Model:     {}", status.embedding_model);
    println!("Chunks:    {}", status.total_chunks);

    if status.libraries.is_empty() {
        println!("\nNo libraries indexed yet. Run 'zotrag index' to start.");
        return;
    }

    println!("\nLibraries:");
    for library in &status.libraries {
        println!(
            "  [{}] {} - v{}, {} items, {} chunks, last run {} ({}){}",
            library.library_id,
            library.library_name,
            library.last_indexed_version,
            library.total_items_indexed,
            library.total_chunks,
            library.last_indexed_at,
            library.indexing_mode,
            if library.force_reindex {
                ", reindex pending"
            } else {
                ""
            }
        );
    }
}
