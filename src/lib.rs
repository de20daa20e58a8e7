//! zotrag - incremental RAG indexing for Zotero libraries
//!
//! Reads items and PDF attachments from a running Zotero desktop instance,
//! chunks and embeds their text, and keeps a Qdrant vector index in sync
//! with the library using Zotero's version numbers.

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod extract;
pub mod index;
pub mod meta;
pub mod models;
pub mod progress;
pub mod store;
pub mod zotero;

pub use error::{Error, Result};
