use std::sync::Arc;

use castfeed::cli::Cli;
use castfeed::cli::Commands;
use castfeed::database::Store;
use castfeed::AppConfig;
use castfeed::Database;
use castfeed::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };

    if cli.verbose {
        castfeed::logging::init_logging_with_level("debug")?;
    } else {
        castfeed::logging::init_logging_with_config(&config)?;
    }
    tracing::debug!("Configuration loaded successfully");

    match cli.command {
        Commands::Config => {
            castfeed::cli::handle_config_command(&config)?;
        }
        Commands::Init => {
            let database = Database::from_config(&config).await?;
            castfeed::cli::handle_init_command(&database).await?;
        }
        Commands::Sync(sync_command) => {
            let store = open_store(&config).await?;
            castfeed::cli::handle_sync_command(&config, store, sync_command).await?;
        }
        Commands::Checkpoint(checkpoint_command) => {
            let store = open_store(&config).await?;
            castfeed::cli::handle_checkpoint_command(store.as_ref(), &checkpoint_command).await?;
        }
        Commands::Enrich { limit } => {
            let store = open_store(&config).await?;
            castfeed::cli::handle_enrich_command(&config, store, limit).await?;
        }
        Commands::Rank(rank_command) => {
            let store = open_store(&config).await?;
            castfeed::cli::handle_rank_command(&config, store, rank_command).await?;
        }
    }

    Ok(())
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>> {
    let database = Database::from_config(config).await?;
    Ok(Arc::new(database))
}
