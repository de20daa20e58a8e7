//! Init command - create config and metadata database

use crate::config::Config;
use crate::error::Result;
use crate::meta::MetaDb;
use std::path::PathBuf;
use tracing::info;

/// Create the default configuration and metadata database
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<Config> {
    let config = Config::create_default(base_dir);

    if !config.paths.config_file.exists() || force {
        config.save()?;
        info!("Wrote config to {:?}", config.paths.config_file);
    }

    // Opening creates the database file and schema
    MetaDb::open(&config.paths.db_file).await?;
    info!("Metadata database ready at {:?}", config.paths.db_file);

    Ok(config)
}
