//! Default values for configuration

/// Default Zotero local API base URL
pub fn default_zotero_url() -> String {
    std::env::var("ZOTERO_API_URL").unwrap_or_else(|_| "http://localhost:23119".to_string())
}

/// Default Zotero request timeout in seconds
pub fn default_zotero_timeout() -> u64 {
    30
}

/// Default page size when listing library items
pub fn default_zotero_page_size() -> usize {
    100
}

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default collection name for document chunks
pub fn default_chunks_collection() -> String {
    "document_chunks".to_string()
}

/// Default collection name for deduplication records
pub fn default_dedup_collection() -> String {
    "deduplication".to_string()
}

/// Default embedding model
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension (matches the default model)
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default embedding backend URL (OpenAI-compatible /embeddings endpoint)
pub fn default_embedding_backend_url() -> String {
    std::env::var("ZOTRAG_EMBEDDING_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default batch size for embedding requests
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default maximum characters per chunk
pub fn default_chunk_max_chars() -> usize {
    512
}

/// Default overlap budget in characters
pub fn default_chunk_overlap() -> usize {
    50
}

/// Default cap on chunks returned for a single item
pub fn default_item_chunk_cap() -> usize {
    10_000
}
