//! CLI command definitions and argument parsing

use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;

use crate::models::CastId;
use crate::ranking::Metric;
use crate::ranking::SubjectKind;
use crate::ranking::Window;

#[derive(Parser)]
#[command(name = "castfeed")]
#[command(about = "Farcaster hub ingestion and feed ranking")]
#[command(version)]
pub struct Cli {
    /// Enable verbose debug logging (default: level from config)
    #[arg(short, long)]
    pub verbose: bool,

    /// Path to the configuration file (default: config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create tables and indexes
    Init,
    /// Ingest from the hub
    #[command(subcommand)]
    Sync(SyncCommands),
    /// Inspect or reset sync checkpoints
    #[command(subcommand)]
    Checkpoint(CheckpointCommands),
    /// Extract keywords for casts that have none yet
    Enrich {
        /// Maximum number of pending casts to process
        #[arg(short, long, default_value = "1000")]
        limit: usize,
    },
    /// Ranked views over stored casts
    #[command(subcommand)]
    Rank(RankCommands),
    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Walk every fid from the saved checkpoint up to the hub's max fid
    Backfill {
        #[command(flatten)]
        enrich: EnrichFlag,
    },
    /// Follow the hub event feed until interrupted
    Live {
        /// Start from this event id instead of the saved checkpoint
        #[arg(long)]
        from_event_id: Option<u64>,
        #[command(flatten)]
        enrich: EnrichFlag,
    },
    /// Sync selected accounts and casts
    Manual {
        /// Account to sync fully (repeatable)
        #[arg(long = "fid")]
        fids: Vec<u64>,
        /// Cast to fetch with its reactions, as `fid:0xhash` (repeatable)
        #[arg(long = "cast")]
        casts: Vec<CastId>,
        #[command(flatten)]
        enrich: EnrichFlag,
    },
}

#[derive(Args, Debug, Clone, Copy)]
pub struct EnrichFlag {
    /// Skip keyword enrichment even when it is enabled in the config
    #[arg(long)]
    pub no_enrich: bool,
}

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// List saved checkpoints
    Show,
    /// Delete a checkpoint so the next run starts over
    Reset {
        /// Checkpoint name (`backfill` or `live`)
        name: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum RankCommands {
    /// Time-decayed popularity of recently reacted casts
    Hot {
        /// Zero-based page number
        #[arg(short, long, default_value = "0")]
        page: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Casts with the most reactions in a window
    Top {
        #[arg(short, long, value_enum, default_value = "day")]
        window: Window,
        #[arg(short, long, value_enum, default_value = "likes")]
        metric: Metric,
        /// Only casts written by this fid
        #[arg(long, conflicts_with = "channel")]
        author: Option<u64>,
        /// With --author, only that author's replies
        #[arg(long, requires = "author")]
        replies: bool,
        /// Only casts anchored to this channel URL
        #[arg(long)]
        channel: Option<String>,
        #[arg(short, long, default_value = "25")]
        limit: usize,
        #[arg(short, long, default_value = "0")]
        offset: usize,
        #[arg(long)]
        json: bool,
    },
    /// Weighted activity per subject with rank change against the previous window
    Engagement {
        #[arg(value_enum)]
        kind: SubjectKind,
        #[arg(short, long, value_enum, default_value = "week")]
        window: Window,
        #[arg(short, long, default_value = "25")]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
}
