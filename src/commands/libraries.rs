//! Libraries command - list libraries with their indexing state

use crate::config::Config;
use crate::error::Result;
use crate::meta::{MetaDb, MetadataStore};
use crate::zotero::{DocumentSource, ZoteroLocalApi};
use serde::Serialize;

/// One row of the libraries listing
#[derive(Debug, Clone, Serialize)]
pub struct LibraryListing {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub indexed: bool,
    pub last_indexed_version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_indexed_at: Option<String>,
    pub total_chunks: i64,
    pub force_reindex: bool,
}

/// List libraries from the source, annotated with stored indexing state
pub async fn cmd_libraries(config: &Config, db: &MetaDb) -> Result<Vec<LibraryListing>> {
    let source = ZoteroLocalApi::new(&config.zotero)?;
    let available = source.list_libraries().await?;

    let mut listings = Vec::with_capacity(available.len());
    for library in available {
        let stored = db.get_library(&library.id).await?;
        listings.push(LibraryListing {
            id: library.id,
            kind: library.kind.to_string(),
            name: library.name,
            indexed: stored.is_some(),
            last_indexed_version: stored
                .as_ref()
                .map(|m| m.last_indexed_version)
                .unwrap_or(0),
            last_indexed_at: stored.as_ref().map(|m| m.last_indexed_at.clone()),
            total_chunks: stored.as_ref().map(|m| m.total_chunks).unwrap_or(0),
            force_reindex: stored.as_ref().map(|m| m.force_reindex).unwrap_or(false),
        });
    }

    Ok(listings)
}

/// Print the libraries listing to console
pub fn print_libraries(listings: &[LibraryListing]) {
    if listings.is_empty() {
        println!("No libraries found.");
        return;
    }

    println!("\nLibraries:\n");
    for listing in listings {
        let state = if listing.force_reindex {
            "reindex pending".to_string()
        } else if listing.indexed {
            format!("indexed (v{})", listing.last_indexed_version)
        } else {
            "not indexed".to_string()
        };
        println!(
            "  [{}] {} ({}) - {}, {} chunks",
            listing.id, listing.name, listing.kind, state, listing.total_chunks
        );
    }
}
