//! Configuration management for zotrag
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Zotero local API configuration
    #[serde(default)]
    pub zotero: ZoteroConfig,

    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Qdrant collection for document chunks
    #[serde(default = "default_chunks_collection")]
    pub chunks_collection: String,

    /// Qdrant collection for deduplication records
    #[serde(default = "default_dedup_collection")]
    pub dedup_collection: String,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Indexing configuration
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Zotero local API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoteroConfig {
    /// Base URL of the Zotero local data server
    #[serde(default = "default_zotero_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_zotero_timeout")]
    pub timeout_secs: u64,

    /// Page size for paginated item listings
    #[serde(default = "default_zotero_page_size")]
    pub page_size: usize,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Embedding backend URL (OpenAI-compatible /embeddings endpoint)
    #[serde(default = "default_embedding_backend_url")]
    pub backend_url: String,

    /// Batch size for embedding requests
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_max_chars")]
    pub max_chars: usize,

    /// Overlap budget in characters
    #[serde(default = "default_chunk_overlap")]
    pub overlap_chars: usize,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Cap on chunks returned for a single item
    #[serde(default = "default_item_chunk_cap")]
    pub item_chunk_cap: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for zotrag data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zotero: ZoteroConfig::default(),
            qdrant_url: default_qdrant_url(),
            chunks_collection: default_chunks_collection(),
            dedup_collection: default_dedup_collection(),
            embedding: EmbeddingConfig::default(),
            chunk: ChunkConfig::default(),
            indexing: IndexingConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ZoteroConfig {
    fn default() -> Self {
        Self {
            base_url: default_zotero_url(),
            timeout_secs: default_zotero_timeout(),
            page_size: default_zotero_page_size(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            backend_url: default_embedding_backend_url(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: default_chunk_max_chars(),
            overlap_chars: default_chunk_overlap(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            item_chunk_cap: default_item_chunk_cap(),
        }
    }
}

impl Config {
    /// Get the default base directory for zotrag (~/.zotrag)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".zotrag")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("metadata.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        let contents = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.init_paths(config_path.parent().map(PathBuf::from));
        config.validate()?;

        Ok(config)
    }

    /// Create a default configuration rooted at the given base directory
    pub fn create_default(base_dir: Option<PathBuf>) -> Self {
        let mut config = Config::default();
        config.init_paths(base_dir);
        config
    }

    /// Save configuration to its config file path
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, contents)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            return Err(Error::Config("embedding.dimension must be > 0".to_string()));
        }
        if self.chunk.max_chars == 0 {
            return Err(Error::Config("chunk.max_chars must be > 0".to_string()));
        }
        if self.chunk.overlap_chars >= self.chunk.max_chars {
            return Err(Error::Config(
                "chunk.overlap_chars must be smaller than chunk.max_chars".to_string(),
            ));
        }
        if self.zotero.page_size == 0 {
            return Err(Error::Config("zotero.page_size must be > 0".to_string()));
        }
        Ok(())
    }
}
