//! CLI command handlers
//!
//! - init: schema creation
//! - sync: backfill, live and manual ingestion
//! - checkpoint: resume point inspection and reset
//! - enrich: keyword sweep over stored casts
//! - rank: hot, top and engagement views
//! - config: configuration display

pub mod checkpoint;
pub mod config;
pub mod enrich;
pub mod init;
pub mod rank;
pub mod sync;

pub use checkpoint::*;
pub use config::*;
pub use enrich::*;
pub use init::*;
pub use rank::*;
pub use sync::*;
