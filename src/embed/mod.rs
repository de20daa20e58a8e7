//! Text embedding
//!
//! The `Embedder` trait hides the backend; the default implementation talks
//! to an OpenAI-compatible `/embeddings` endpoint (infinity, llama.cpp,
//! text-embeddings-inference all speak it).

mod http_backend;

pub use http_backend::HttpEmbedder;

use crate::error::{Error, Result};
use async_trait::async_trait;

/// Produces dense vectors for text
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input in the same order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output dimension of this embedder
    fn dimension(&self) -> usize;
}

/// Embed texts in bounded batches, preserving order
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    if batch_size == 0 {
        return Err(Error::Embedding("batch size must be > 0".to_string()));
    }

    let mut all = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size) {
        let vectors = embedder.embed(batch).await?;
        if vectors.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "backend returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            )));
        }
        all.extend(vectors);
    }
    Ok(all)
}
