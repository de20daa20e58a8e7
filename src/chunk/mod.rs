//! Sentence-respecting text chunking
//!
//! Splits page text into bounded segments for embedding while:
//! - Never breaking inside a sentence
//! - Seeding each new chunk with the previous chunk's final sentence as
//!   overlap (when that sentence fits the overlap budget)
//! - Assigning sequential ordinals that continue across page boundaries
//! - Computing content hashes and short previews for citation anchors

use blake3::Hasher;
use unicode_segmentation::UnicodeSegmentation;

/// A chunk of text with position metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// The chunk text content
    pub text: String,

    /// 1-based page number in the source document, if known
    pub page_number: Option<i32>,

    /// Ordinal index across the whole chunking run
    pub index: i64,
}

impl TextChunk {
    /// Blake3 hash of the chunk's own text
    pub fn content_hash(&self) -> String {
        compute_text_hash(&self.text)
    }

    /// First five whitespace-separated tokens, used as a citation anchor
    pub fn text_preview(&self) -> String {
        self.text
            .split_whitespace()
            .take(5)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Compute a stable hash for raw content
pub fn compute_content_hash(content: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content);
    hasher.finalize().to_hex().to_string()
}

/// Compute a stable hash for a string
pub fn compute_text_hash(text: &str) -> String {
    compute_content_hash(text.as_bytes())
}

/// Sentence-respecting chunker with a size cap and overlap budget
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum characters per chunk (a single longer sentence may exceed it)
    max_chunk_size: usize,

    /// A trailing sentence shorter than this is carried into the next chunk
    overlap_size: usize,
}

impl TextChunker {
    pub fn new(max_chunk_size: usize, overlap_size: usize) -> Self {
        Self {
            max_chunk_size,
            overlap_size,
        }
    }

    /// Chunk a single page of text.
    ///
    /// Ordinals start at `start_index`. Empty or whitespace-only input yields
    /// no chunks. If no sentence boundary is detected the whole input becomes
    /// one chunk.
    pub fn chunk_text(
        &self,
        text: &str,
        page_number: Option<i32>,
        start_index: i64,
    ) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let sentences: Vec<&str> = text
            .split_sentence_bounds()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        if sentences.is_empty() {
            return vec![TextChunk {
                text: text.trim().to_string(),
                page_number,
                index: start_index,
            }];
        }

        let mut chunks: Vec<TextChunk> = Vec::new();
        let mut current = String::new();
        let mut last_sentence = String::new();

        for sentence in sentences {
            let potential_len = if current.is_empty() {
                sentence.len()
            } else {
                current.len() + 1 + sentence.len()
            };

            if potential_len > self.max_chunk_size && !current.is_empty() {
                chunks.push(TextChunk {
                    text: std::mem::take(&mut current),
                    page_number,
                    index: start_index + chunks.len() as i64,
                });

                // Seed the new chunk with the previous final sentence when it
                // fits the overlap budget
                if !last_sentence.is_empty() && last_sentence.len() < self.overlap_size {
                    current = format!("{} {}", last_sentence, sentence);
                } else {
                    current = sentence.to_string();
                }
            } else if current.is_empty() {
                current = sentence.to_string();
            } else {
                current.push(' ');
                current.push_str(sentence);
            }

            last_sentence = sentence.to_string();
        }

        if !current.is_empty() {
            chunks.push(TextChunk {
                text: current,
                page_number,
                index: start_index + chunks.len() as i64,
            });
        }

        chunks
    }

    /// Chunk multiple pages, continuing ordinals across page boundaries
    pub fn chunk_pages(&self, pages: &[(i32, String)]) -> Vec<TextChunk> {
        let mut all_chunks = Vec::new();
        let mut next_index = 0i64;

        for (page_number, page_text) in pages {
            let page_chunks = self.chunk_text(page_text, Some(*page_number), next_index);
            next_index += page_chunks.len() as i64;
            all_chunks.extend(page_chunks);
        }

        all_chunks
    }
}
