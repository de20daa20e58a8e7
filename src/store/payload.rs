//! Payload schema for Qdrant points

use crate::models::{ChunkMetadata, DocumentChunk};
use qdrant_client::qdrant::{PointStruct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Deterministic point id for a chunk, derived from its chunk id so
/// re-indexing the same chunk overwrites rather than duplicates
pub fn chunk_point_id(chunk_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, chunk_id.as_bytes())
}

/// Deterministic point id for a dedup record, derived from the content hash
pub fn dedup_point_id(content_hash: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, content_hash.as_bytes())
}

/// A point ready to be upserted to Qdrant
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl ChunkPoint {
    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        PointStruct::new(
            self.id.to_string(),
            self.vector,
            self.payload.to_qdrant_payload(),
        )
    }
}

/// Payload stored with each chunk in Qdrant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub chunk_id: String,
    pub library_id: String,
    pub item_key: String,
    pub attachment_key: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,

    /// Full chunk text, returned to retrieval callers
    pub text: String,
    pub text_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i32>,
    pub chunk_index: i64,
    pub content_hash: String,

    pub item_version: i64,
    pub attachment_version: i64,
    pub indexed_at: String,
    pub source_modified: String,
    pub schema_version: i64,
}

impl ChunkPayload {
    /// Build a payload from a chunk. Fails upstream validation if the chunk
    /// has no embedding; the payload itself carries only metadata and text.
    pub fn from_chunk(text: &str, meta: &ChunkMetadata) -> Self {
        Self {
            chunk_id: meta.chunk_id.clone(),
            library_id: meta.document.library_id.clone(),
            item_key: meta.document.item_key.clone(),
            attachment_key: meta.document.attachment_key.clone().unwrap_or_default(),
            title: meta.document.title.clone(),
            authors: meta.document.authors.clone(),
            year: meta.document.year,
            item_type: meta.document.item_type.clone(),
            text: text.to_string(),
            text_preview: meta.text_preview.clone(),
            page_number: meta.page_number,
            chunk_index: meta.chunk_index,
            content_hash: meta.content_hash.clone(),
            item_version: meta.item_version,
            attachment_version: meta.attachment_version,
            indexed_at: meta.indexed_at.clone(),
            source_modified: meta.source_modified.clone(),
            schema_version: meta.schema_version,
        }
    }

    /// Convert to Qdrant payload format
    pub fn to_qdrant_payload(self) -> HashMap<String, QdrantValue> {
        let mut map = HashMap::new();

        map.insert("chunk_id".to_string(), string_to_qdrant(&self.chunk_id));
        map.insert("library_id".to_string(), string_to_qdrant(&self.library_id));
        map.insert("item_key".to_string(), string_to_qdrant(&self.item_key));
        map.insert(
            "attachment_key".to_string(),
            string_to_qdrant(&self.attachment_key),
        );

        if let Some(ref title) = self.title {
            map.insert("title".to_string(), string_to_qdrant(title));
        }
        if !self.authors.is_empty() {
            let values: Vec<QdrantValue> =
                self.authors.iter().map(|a| string_to_qdrant(a)).collect();
            map.insert(
                "authors".to_string(),
                QdrantValue {
                    kind: Some(qdrant_client::qdrant::value::Kind::ListValue(
                        qdrant_client::qdrant::ListValue { values },
                    )),
                },
            );
        }
        if let Some(year) = self.year {
            map.insert("year".to_string(), int_to_qdrant(year as i64));
        }
        if let Some(ref item_type) = self.item_type {
            map.insert("item_type".to_string(), string_to_qdrant(item_type));
        }

        map.insert("text".to_string(), string_to_qdrant(&self.text));
        map.insert(
            "text_preview".to_string(),
            string_to_qdrant(&self.text_preview),
        );
        if let Some(page) = self.page_number {
            map.insert("page_number".to_string(), int_to_qdrant(page as i64));
        }
        map.insert("chunk_index".to_string(), int_to_qdrant(self.chunk_index));
        map.insert(
            "content_hash".to_string(),
            string_to_qdrant(&self.content_hash),
        );

        map.insert("item_version".to_string(), int_to_qdrant(self.item_version));
        map.insert(
            "attachment_version".to_string(),
            int_to_qdrant(self.attachment_version),
        );
        map.insert("indexed_at".to_string(), string_to_qdrant(&self.indexed_at));
        map.insert(
            "source_modified".to_string(),
            string_to_qdrant(&self.source_modified),
        );
        map.insert(
            "schema_version".to_string(),
            int_to_qdrant(self.schema_version),
        );

        map
    }
}

/// Payload stored with each deduplication record. The dedup collection
/// carries 1-dimension dummy vectors; only the payload matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupPayload {
    pub content_hash: String,
    pub library_id: String,
    pub item_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation_uri: Option<String>,
}

impl DedupPayload {
    pub fn to_qdrant_payload(self) -> HashMap<String, QdrantValue> {
        let mut map = HashMap::new();
        map.insert(
            "content_hash".to_string(),
            string_to_qdrant(&self.content_hash),
        );
        map.insert("library_id".to_string(), string_to_qdrant(&self.library_id));
        map.insert("item_key".to_string(), string_to_qdrant(&self.item_key));
        if let Some(ref uri) = self.relation_uri {
            map.insert("relation_uri".to_string(), string_to_qdrant(uri));
        }
        map
    }
}

/// Build the upsert-ready point for an embedded chunk
pub fn chunk_to_point(chunk: &DocumentChunk, embedding: Vec<f32>) -> ChunkPoint {
    ChunkPoint {
        id: chunk_point_id(&chunk.metadata.chunk_id),
        vector: embedding,
        payload: ChunkPayload::from_chunk(&chunk.text, &chunk.metadata),
    }
}

fn string_to_qdrant(s: &str) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::StringValue(
            s.to_string(),
        )),
    }
}

fn int_to_qdrant(i: i64) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::IntegerValue(i)),
    }
}
