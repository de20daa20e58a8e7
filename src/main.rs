//! zotrag CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zotrag::{
    commands::{
        cmd_index, cmd_init, cmd_libraries, cmd_reset, cmd_status, print_index_stats,
        print_libraries, print_reset_outcome, print_status, IndexOptions,
    },
    config::Config,
    error::Result,
    meta::MetaDb,
    models::IndexingMode,
    progress::LogWriterFactory,
    store::VectorStore,
};

#[derive(Parser)]
#[command(name = "zotrag")]
#[command(version, about = "Incremental RAG indexing for Zotero libraries", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize zotrag configuration and metadata database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Index a library (incremental by default once a baseline exists)
    Index {
        /// Library ID to index (defaults to the user library)
        #[arg(short, long)]
        library: Option<String>,

        /// Index every library on the Zotero instance
        #[arg(long, conflicts_with = "library")]
        all: bool,

        /// Indexing mode: auto, incremental, or full
        #[arg(short, long, default_value = "auto")]
        mode: IndexingMode,

        /// Stop after this many items (diagnostic runs)
        #[arg(long)]
        max_items: Option<usize>,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// List libraries and their indexing state
    Libraries,

    /// Show system status
    Status,

    /// Flag libraries for a full reindex on the next run
    Reset {
        /// Library ID to flag (defaults to all known libraries)
        #[arg(short, long)]
        library: Option<String>,

        /// Delete all indexed data and metadata instead of flagging
        #[arg(long)]
        purge: bool,

        /// Skip confirmation prompt (required with --purge)
        #[arg(long)]
        yes: bool,
    },

    /// Manage Qdrant collections
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

/// Database management actions
#[derive(Subcommand)]
enum DbAction {
    /// Create the Qdrant collections
    Init,

    /// Show chunk counts
    Status,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Init does not need an existing config
    if let Commands::Init { force } = &cli.command {
        let base_dir = cli.config.as_deref().and_then(|p| p.parent().map(PathBuf::from));
        let config = cmd_init(base_dir, *force).await?;
        println!("✓ zotrag initialized");
        println!("  Config: {}", config.paths.config_file.display());
        println!("\nNext steps:");
        println!("  1. Make sure Zotero is running with the local API enabled");
        println!("  2. Start Qdrant: docker run -p 6333:6333 -p 6334:6334 qdrant/qdrant");
        println!("  3. Index your library: zotrag index");
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let db = Arc::new(MetaDb::open(&config.paths.db_file).await?);

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Index {
            library,
            all,
            mode,
            max_items,
            no_progress,
        } => {
            let options = IndexOptions {
                library_id: library,
                all,
                mode,
                max_items,
                show_progress: !no_progress && !cli.json,
            };

            let results = cmd_index(&config, db, options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for stats in &results {
                    print_index_stats(stats);
                }
            }
        }

        Commands::Libraries => {
            let listings = cmd_libraries(&config, &db).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&listings)?);
            } else {
                print_libraries(&listings);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &db).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Reset {
            library,
            purge,
            yes,
        } => {
            if purge && !yes {
                eprintln!("⚠️  This will delete ALL indexed data!");
                eprintln!("Run with --yes to confirm.");
                std::process::exit(1);
            }

            let outcome = cmd_reset(&config, &db, library.as_deref(), purge).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_reset_outcome(&outcome);
            }
        }

        Commands::Db { action } => {
            let store = VectorStore::connect(&config).await?;
            match action {
                DbAction::Init => {
                    store.ensure_collections().await?;
                    println!("✓ Qdrant collections initialized");
                }
                DbAction::Status => {
                    let count = store.count_all_chunks().await?;
                    if cli.json {
                        println!(r#"{{"chunks": {}}}"#, count);
                    } else {
                        println!("Chunks stored: {}", count);
                    }
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'zotrag init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
