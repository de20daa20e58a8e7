//! Reset command - flag a library for reindexing or purge everything

use crate::config::Config;
use crate::error::Result;
use crate::meta::{MetaDb, MetadataStore};
use crate::store::{ChunkStore, DedupIndex, VectorStore};
use serde::Serialize;
use tracing::info;

/// Outcome of a reset operation
#[derive(Debug, Clone, Serialize)]
pub struct ResetOutcome {
    pub purged: bool,
    pub libraries_flagged: Vec<String>,
    pub chunks_deleted: u64,
}

/// Flag one library (or all known libraries) so the next run is full.
/// With `purge`, indexed data is deleted instead: one library's chunks and
/// metadata row, or both Qdrant collections and every row when no library
/// is given. Everything purged is rebuilt from scratch on the next run.
pub async fn cmd_reset(
    config: &Config,
    db: &MetaDb,
    library_id: Option<&str>,
    purge: bool,
) -> Result<ResetOutcome> {
    if purge {
        let store = VectorStore::connect(config).await?;

        if let Some(id) = library_id {
            let deleted = store.delete_library_chunks(id).await?;
            store.delete_library_records(id).await?;
            db.delete_library(id).await?;

            info!("Purged {} chunk(s) and metadata for library {}", deleted, id);
            return Ok(ResetOutcome {
                purged: true,
                libraries_flagged: vec![id.to_string()],
                chunks_deleted: deleted,
            });
        }

        store.reset_collections().await?;

        let mut removed = Vec::new();
        for library in db.list_libraries().await? {
            db.delete_library(&library.library_id).await?;
            removed.push(library.library_id);
        }

        info!("Purged collections and {} library record(s)", removed.len());
        return Ok(ResetOutcome {
            purged: true,
            libraries_flagged: removed,
            chunks_deleted: 0,
        });
    }

    let mut flagged = Vec::new();
    match library_id {
        Some(id) => {
            db.mark_for_reset(id).await?;
            flagged.push(id.to_string());
        }
        None => {
            for library in db.list_libraries().await? {
                db.mark_for_reset(&library.library_id).await?;
                flagged.push(library.library_id);
            }
        }
    }

    info!("Flagged {} library(ies) for full reindex", flagged.len());
    Ok(ResetOutcome {
        purged: false,
        libraries_flagged: flagged,
        chunks_deleted: 0,
    })
}

/// Print reset outcome to console
pub fn print_reset_outcome(outcome: &ResetOutcome) {
    if outcome.purged {
        if outcome.chunks_deleted > 0 {
            println!(
                "✓ Purged {} chunk(s) and metadata for {}",
                outcome.chunks_deleted,
                outcome.libraries_flagged.join(", ")
            );
        } else {
            println!(
                "✓ All indexed data purged ({} library record(s) removed)",
                outcome.libraries_flagged.len()
            );
        }
        return;
    }
    println!(
        "✓ Flagged for full reindex: {}",
        outcome.libraries_flagged.join(", ")
    );
    println!("The next 'zotrag index' run will rebuild these libraries.");
}
