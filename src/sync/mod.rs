//! Hub synchronization
//!
//! [`client`] talks to a Farcaster hub, [`types`] decodes its messages and
//! [`dispatcher`] routes each message to ingestion or the store, in backfill,
//! live or manual mode.

pub mod client;
pub mod dispatcher;
pub mod state;
pub mod types;

pub use client::HistoryKind;
pub use client::HttpHubClient;
pub use client::HubClient;
pub use dispatcher::Dispatcher;
pub use dispatcher::SyncMode;
pub use state::SyncStats;
pub use types::*;
