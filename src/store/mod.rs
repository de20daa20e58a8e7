//! Qdrant vector database integration
//!
//! Two collections back the index:
//! - the chunks collection, holding embedded chunk points with full payloads
//! - the deduplication collection, holding one dummy-vector point per
//!   distinct attachment content hash
//!
//! The `ChunkStore` and `DedupIndex` traits are the seams the indexer
//! depends on; `VectorStore` implements both against Qdrant.

mod payload;

pub use payload::*;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{DeduplicationRecord, DocumentChunk};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    GetPointsBuilder, PointId, PointStruct, ScrollPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info};

/// Persistent storage for embedded chunks
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Upsert a batch of chunks. Every chunk must carry an embedding;
    /// a missing embedding fails the whole batch before anything is written.
    async fn add_chunks(&self, chunks: &[DocumentChunk]) -> Result<u64>;

    /// Stored chunk payloads for one item, bounded by `limit`
    async fn get_item_chunks(
        &self,
        library_id: &str,
        item_key: &str,
        limit: usize,
    ) -> Result<Vec<ChunkPayload>>;

    /// Delete all chunks belonging to one item, returning how many existed
    async fn delete_item_chunks(&self, library_id: &str, item_key: &str) -> Result<u64>;

    /// Delete every chunk in one library, returning how many existed
    async fn delete_library_chunks(&self, library_id: &str) -> Result<u64>;

    /// The item version stored on this item's chunks. `None` when the item
    /// has no chunks, or when its chunks predate version tracking.
    async fn item_version(&self, library_id: &str, item_key: &str) -> Result<Option<i64>>;

    /// Number of chunks stored for one library
    async fn count_library_chunks(&self, library_id: &str) -> Result<u64>;
}

/// Content-hash index used to skip attachments already indexed elsewhere
#[async_trait]
pub trait DedupIndex: Send + Sync {
    /// Look up the record for a content hash, if one exists
    async fn find(&self, content_hash: &str) -> Result<Option<DeduplicationRecord>>;

    /// Record a content hash as indexed. Check-before-record is not atomic;
    /// concurrent runs over duplicate content may both index it, which is
    /// wasteful but harmless since chunk point ids are deterministic.
    async fn record(&self, record: &DeduplicationRecord) -> Result<()>;

    /// Delete every record owned by one library, returning how many existed
    async fn delete_library_records(&self, library_id: &str) -> Result<u64>;
}

/// Qdrant-backed implementation of both stores
pub struct VectorStore {
    client: Qdrant,
    chunks_collection: String,
    dedup_collection: String,
    dimension: usize,
}

impl VectorStore {
    /// Connect to Qdrant using config
    pub async fn connect(config: &Config) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", config.qdrant_url);

        let client = Qdrant::from_url(&config.qdrant_url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            chunks_collection: config.chunks_collection.clone(),
            dedup_collection: config.dedup_collection.clone(),
            dimension: config.embedding.dimension,
        })
    }

    /// Ensure both collections exist with correct configuration
    pub async fn ensure_collections(&self) -> Result<()> {
        if !self.client.collection_exists(&self.chunks_collection).await? {
            info!(
                "Creating collection {} with dimension {}",
                self.chunks_collection, self.dimension
            );
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.chunks_collection).vectors_config(
                        VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                    ),
                )
                .await?;
        }

        if !self.client.collection_exists(&self.dedup_collection).await? {
            info!("Creating dedup collection {}", self.dedup_collection);
            // Payload-only collection; the 1-dim dot-product vector is a stub
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.dedup_collection)
                        .vectors_config(VectorParamsBuilder::new(1, Distance::Dot)),
                )
                .await?;
        }

        Ok(())
    }

    /// Delete and recreate both collections
    pub async fn reset_collections(&self) -> Result<()> {
        for collection in [&self.chunks_collection, &self.dedup_collection] {
            if self.client.collection_exists(collection).await? {
                info!("Deleting collection {}", collection);
                self.client.delete_collection(collection).await?;
            }
        }
        self.ensure_collections().await
    }

    /// Total points in the chunks collection
    pub async fn count_all_chunks(&self) -> Result<u64> {
        if !self.client.collection_exists(&self.chunks_collection).await? {
            return Ok(0);
        }
        let info = self.client.collection_info(&self.chunks_collection).await?;
        Ok(info
            .result
            .and_then(|r| r.points_count)
            .unwrap_or(0))
    }

    fn item_filter(library_id: &str, item_key: &str) -> Filter {
        Filter::must([
            Condition::matches("library_id", library_id.to_string()),
            Condition::matches("item_key", item_key.to_string()),
        ])
    }

    fn library_filter(library_id: &str) -> Filter {
        Filter::must([Condition::matches("library_id", library_id.to_string())])
    }

    async fn delete_with_filter(&self, filter: Filter) -> Result<u64> {
        let existing = self.count_with_filter(filter.clone()).await?;
        if existing > 0 {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&self.chunks_collection).points(filter),
                )
                .await?;
        }
        Ok(existing)
    }

    async fn count_with_filter(&self, filter: Filter) -> Result<u64> {
        let response = self
            .client
            .count(
                CountPointsBuilder::new(&self.chunks_collection)
                    .filter(filter)
                    .exact(true),
            )
            .await?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}

#[async_trait]
impl ChunkStore for VectorStore {
    async fn add_chunks(&self, chunks: &[DocumentChunk]) -> Result<u64> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut points: Vec<PointStruct> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = chunk.embedding.as_ref().ok_or_else(|| {
                Error::Validation(format!(
                    "chunk {} has no embedding",
                    chunk.metadata.chunk_id
                ))
            })?;
            points.push(chunk_to_point(chunk, embedding.clone()).to_point_struct());
        }

        debug!(
            "Upserting {} point(s) to {}",
            points.len(),
            self.chunks_collection
        );

        let count = points.len() as u64;
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.chunks_collection, points))
            .await?;

        Ok(count)
    }

    async fn get_item_chunks(
        &self,
        library_id: &str,
        item_key: &str,
        limit: usize,
    ) -> Result<Vec<ChunkPayload>> {
        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&self.chunks_collection)
                    .filter(Self::item_filter(library_id, item_key))
                    .limit(limit as u32)
                    .with_payload(true)
                    .with_vectors(false),
            )
            .await?;

        response
            .result
            .into_iter()
            .map(|point| {
                let payload: serde_json::Map<String, serde_json::Value> = point
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, json_from_qdrant_value(v)))
                    .collect();
                serde_json::from_value(serde_json::Value::Object(payload)).map_err(Error::from)
            })
            .collect()
    }

    async fn delete_item_chunks(&self, library_id: &str, item_key: &str) -> Result<u64> {
        let deleted = self
            .delete_with_filter(Self::item_filter(library_id, item_key))
            .await?;
        if deleted > 0 {
            debug!(
                "Deleted {} chunk(s) for item {}:{}",
                deleted, library_id, item_key
            );
        }
        Ok(deleted)
    }

    async fn delete_library_chunks(&self, library_id: &str) -> Result<u64> {
        let deleted = self
            .delete_with_filter(Self::library_filter(library_id))
            .await?;
        debug!("Deleted {} chunk(s) for library {}", deleted, library_id);
        Ok(deleted)
    }

    async fn item_version(&self, library_id: &str, item_key: &str) -> Result<Option<i64>> {
        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&self.chunks_collection)
                    .filter(Self::item_filter(library_id, item_key))
                    .limit(1)
                    .with_payload(true)
                    .with_vectors(false),
            )
            .await?;

        let Some(point) = response.result.into_iter().next() else {
            return Ok(None);
        };

        // Older payloads lack the field; callers treat that as never indexed
        match point.payload.get("item_version").and_then(|v| v.kind.as_ref()) {
            Some(qdrant_client::qdrant::value::Kind::IntegerValue(v)) => Ok(Some(*v)),
            _ => Ok(None),
        }
    }

    async fn count_library_chunks(&self, library_id: &str) -> Result<u64> {
        self.count_with_filter(Self::library_filter(library_id)).await
    }
}

/// Convert a Qdrant payload value to serde_json for deserialization
fn json_from_qdrant_value(v: qdrant_client::qdrant::Value) -> serde_json::Value {
    use qdrant_client::qdrant::value::Kind;
    use serde_json::Value;

    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(json_from_qdrant_value).collect())
        }
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}

#[async_trait]
impl DedupIndex for VectorStore {
    async fn find(&self, content_hash: &str) -> Result<Option<DeduplicationRecord>> {
        let point_id = PointId::from(dedup_point_id(content_hash).to_string());
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.dedup_collection, vec![point_id])
                    .with_payload(true)
                    .with_vectors(false),
            )
            .await?;

        let Some(point) = response.result.into_iter().next() else {
            return Ok(None);
        };

        let get_str = |key: &str| -> Option<String> {
            match point.payload.get(key).and_then(|v| v.kind.as_ref()) {
                Some(qdrant_client::qdrant::value::Kind::StringValue(s)) => Some(s.clone()),
                _ => None,
            }
        };

        Ok(Some(DeduplicationRecord {
            content_hash: get_str("content_hash").unwrap_or_else(|| content_hash.to_string()),
            library_id: get_str("library_id").unwrap_or_default(),
            item_key: get_str("item_key").unwrap_or_default(),
            relation_uri: get_str("relation_uri"),
        }))
    }

    async fn record(&self, record: &DeduplicationRecord) -> Result<()> {
        let payload = DedupPayload {
            content_hash: record.content_hash.clone(),
            library_id: record.library_id.clone(),
            item_key: record.item_key.clone(),
            relation_uri: record.relation_uri.clone(),
        };

        let point = PointStruct::new(
            dedup_point_id(&record.content_hash).to_string(),
            vec![0.0f32],
            payload.to_qdrant_payload(),
        );

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.dedup_collection, vec![point]))
            .await?;

        Ok(())
    }

    async fn delete_library_records(&self, library_id: &str) -> Result<u64> {
        let filter = Self::library_filter(library_id);
        let existing = self
            .client
            .count(
                CountPointsBuilder::new(&self.dedup_collection)
                    .filter(filter.clone())
                    .exact(true),
            )
            .await?
            .result
            .map(|r| r.count)
            .unwrap_or(0);

        if existing > 0 {
            self.client
                .delete_points(DeletePointsBuilder::new(&self.dedup_collection).points(filter))
                .await?;
            debug!(
                "Deleted {} dedup record(s) for library {}",
                existing, library_id
            );
        }
        Ok(existing)
    }
}
