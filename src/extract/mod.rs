//! PDF text extraction
//!
//! Extraction is CPU-bound, so it runs on the blocking thread pool. Pages
//! come back individually so chunk metadata can carry page numbers.

use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Text extracted from one page of a document
#[derive(Debug, Clone)]
pub struct PageText {
    /// 1-based page number
    pub page_number: i32,
    pub text: String,
}

/// Turns attachment bytes into per-page text
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: Vec<u8>) -> Result<Vec<PageText>>;
}

/// PDF extractor backed by pdf-extract
#[derive(Default)]
pub struct PdfExtractor;

#[async_trait]
impl TextExtractor for PdfExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> Result<Vec<PageText>> {
        extract_pages(bytes).await
    }
}

/// Extract per-page text from PDF bytes.
///
/// Pages that yield no text (scanned images, empty pages) are dropped.
/// Returns an empty vector when the document has no extractable text at all.
pub async fn extract_pages(bytes: Vec<u8>) -> Result<Vec<PageText>> {
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| Error::Extract(format!("extraction task panicked: {}", e)))?
        .map_err(|e| Error::Extract(e.to_string()))?;

    let pages = split_pages(&text);
    if pages.is_empty() {
        warn!("No extractable text in document");
    } else {
        debug!("Extracted text from {} page(s)", pages.len());
    }

    Ok(pages)
}

/// Split extracted text on the form feeds pdf-extract writes between pages.
/// A document without form feeds comes back as a single page.
fn split_pages(text: &str) -> Vec<PageText> {
    text.split('\x0c')
        .enumerate()
        .filter_map(|(i, page)| {
            let text = normalize_text(page);
            if text.is_empty() {
                None
            } else {
                Some(PageText {
                    page_number: (i + 1) as i32,
                    text,
                })
            }
        })
        .collect()
}

/// Collapse runs of whitespace and trim. PDF text extraction tends to
/// produce hard line breaks mid-sentence and repeated spaces.
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
