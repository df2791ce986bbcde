//! Storage layer
//!
//! Everything the pipeline persists goes through the [`Store`] trait. Two
//! implementations exist:
//!
//! - [`Database`]: `PostgreSQL` via a `sqlx` pool. Writes are chunked
//!   multi-row `INSERT ... ON CONFLICT DO NOTHING` statements followed by a
//!   timestamp-gated undelete, all inside one transaction per batch.
//! - [`MemoryStore`]: an in-process store with the same semantics and a write
//!   log, used by tests and dry runs.
//!
//! # Soft deletes
//!
//! Nothing is ever purged. A remove marks the row deleted when the remove is at
//! least as new as the row. A deleted row comes back only when an add arrives
//! that is strictly newer than the remove; replaying the original add is a
//! no-op. A remove for a reaction, link or verification that was never stored
//! leaves a tombstone row so the later add is judged against it.
//!
//! # Examples
//!
//! ```rust,no_run
//! use castfeed::{AppConfig, Database, Store};
//!
//! # async fn example() -> castfeed::Result<()> {
//! let config = AppConfig::load()?;
//! let database = Database::from_config(&config).await?;
//! database.init_schema().await?;
//!
//! let backfill = database.get_checkpoint("backfill").await?;
//! println!("backfill checkpoint: {backfill:?}");
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;

use crate::models::Cast;
use crate::models::CastHash;
use crate::models::CastId;
use crate::models::CastRecord;
use crate::models::Keyword;
use crate::models::Link;
use crate::models::ProfileField;
use crate::models::Reaction;
use crate::models::Verification;
use crate::ranking::ReactionTally;
use crate::ranking::SubjectCounts;
use crate::ranking::SubjectKind;
use crate::ranking::TopEntry;
use crate::ranking::TopQuery;
use crate::ranking::TopScope;
use crate::Result;

mod batch;
mod casts;
mod checkpoints;
mod keywords;
mod memory;
mod profiles;
mod ranking;
mod reactions;
mod schema;

pub use memory::MemoryStore;
pub use memory::WriteOp;

/// Checkpoint name holding the last fully backfilled fid
pub const CHECKPOINT_BACKFILL: &str = "backfill";
/// Checkpoint name holding the last processed hub event id
pub const CHECKPOINT_LIVE: &str = "live";

/// Rows touched by one cast batch write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CastWriteSummary {
    /// Casts that did not exist before
    pub inserted: u64,
    /// Soft-deleted casts revived by a newer add
    pub undeleted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub name: String,
    pub value: i64,
    pub updated_at: DateTime<Utc>,
}

/// Persistence operations used by ingestion, enrichment and ranking
#[async_trait]
pub trait Store: Send + Sync {
    /// Write casts with their mentions and embeds in one transaction
    async fn upsert_casts(&self, records: &[CastRecord], chunk_size: usize) -> Result<CastWriteSummary>;

    /// Stored casts among `ids`, deleted ones included
    async fn get_casts(&self, ids: &[CastId]) -> Result<Vec<Cast>>;

    /// Soft-delete a cast; returns false when there was nothing to delete
    async fn remove_cast(&self, id: &CastId, removed_at: DateTime<Utc>) -> Result<bool>;

    async fn upsert_reactions(&self, reactions: &[Reaction], chunk_size: usize) -> Result<u64>;

    async fn remove_reactions(&self, reactions: &[Reaction], chunk_size: usize) -> Result<u64>;

    async fn upsert_links(&self, links: &[Link], chunk_size: usize) -> Result<u64>;

    async fn remove_links(&self, links: &[Link], chunk_size: usize) -> Result<u64>;

    /// Latest value wins per (fid, field)
    async fn upsert_profile_fields(&self, fields: &[ProfileField], chunk_size: usize) -> Result<u64>;

    async fn upsert_verifications(&self, verifications: &[Verification], chunk_size: usize) -> Result<u64>;

    async fn remove_verifications(&self, verifications: &[Verification], chunk_size: usize) -> Result<u64>;

    /// Hashes among `ids` that have keywords or a processed marker
    async fn enriched_among(&self, ids: &[CastId]) -> Result<HashSet<CastHash>>;

    /// Persist extracted keywords and mark the cast processed
    async fn save_keywords(&self, cast: &CastId, keywords: &[Keyword], chunk_size: usize) -> Result<u64>;

    /// Newest non-deleted casts that were never enriched
    async fn pending_enrichment(&self, limit: usize) -> Result<Vec<Cast>>;

    async fn get_checkpoint(&self, name: &str) -> Result<Option<i64>>;

    async fn set_checkpoint(&self, name: &str, value: i64) -> Result<()>;

    async fn delete_checkpoint(&self, name: &str) -> Result<bool>;

    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>>;

    /// Per-cast reaction counts since `since`, restricted to `scope`
    async fn reaction_tallies(&self, since: Option<DateTime<Utc>>, scope: &TopScope) -> Result<Vec<ReactionTally>>;

    /// Casts ordered by reaction count for the query's metric and window
    async fn top_targets(&self, query: &TopQuery, now: DateTime<Utc>) -> Result<Vec<TopEntry>>;

    /// Activity counts per subject for timestamps in `[start, end)`
    async fn subject_counts(
        &self,
        kind: SubjectKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SubjectCounts>>;
}

/// Database connection pool wrapper
///
/// This type is `Clone`; clones share the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new database instance from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot connect within the configured timeout
    pub async fn from_config(config: &crate::config::AppConfig) -> Result<Self> {
        let pool_options = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections())
            .min_connections(config.min_connections())
            .acquire_timeout(std::time::Duration::from_secs(config.connection_timeout()));

        let pool = pool_options.connect(config.database_url()).await?;

        tracing::debug!(
            "Database pool configured: max_connections={}, min_connections={}",
            config.max_connections(),
            config.min_connections()
        );

        Ok(Self::new(pool))
    }

    /// Get a reference to the database pool for raw queries
    #[must_use]
    pub const fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for Database {
    async fn upsert_casts(&self, records: &[CastRecord], chunk_size: usize) -> Result<CastWriteSummary> {
        Self::upsert_cast_records(self, records, chunk_size).await
    }

    async fn get_casts(&self, ids: &[CastId]) -> Result<Vec<Cast>> {
        Self::get_casts_by_id(self, ids).await
    }

    async fn remove_cast(&self, id: &CastId, removed_at: DateTime<Utc>) -> Result<bool> {
        Self::soft_delete_cast(self, id, removed_at).await
    }

    async fn upsert_reactions(&self, reactions: &[Reaction], chunk_size: usize) -> Result<u64> {
        Self::insert_reactions(self, reactions, chunk_size).await
    }

    async fn remove_reactions(&self, reactions: &[Reaction], chunk_size: usize) -> Result<u64> {
        Self::tombstone_reactions(self, reactions, chunk_size).await
    }

    async fn upsert_links(&self, links: &[Link], chunk_size: usize) -> Result<u64> {
        Self::insert_links(self, links, chunk_size).await
    }

    async fn remove_links(&self, links: &[Link], chunk_size: usize) -> Result<u64> {
        Self::tombstone_links(self, links, chunk_size).await
    }

    async fn upsert_profile_fields(&self, fields: &[ProfileField], chunk_size: usize) -> Result<u64> {
        Self::write_profile_fields(self, fields, chunk_size).await
    }

    async fn upsert_verifications(&self, verifications: &[Verification], chunk_size: usize) -> Result<u64> {
        Self::insert_verifications(self, verifications, chunk_size).await
    }

    async fn remove_verifications(&self, verifications: &[Verification], chunk_size: usize) -> Result<u64> {
        Self::tombstone_verifications(self, verifications, chunk_size).await
    }

    async fn enriched_among(&self, ids: &[CastId]) -> Result<HashSet<CastHash>> {
        Self::enriched_hashes(self, ids).await
    }

    async fn save_keywords(&self, cast: &CastId, keywords: &[Keyword], chunk_size: usize) -> Result<u64> {
        Self::insert_keywords(self, cast, keywords, chunk_size).await
    }

    async fn pending_enrichment(&self, limit: usize) -> Result<Vec<Cast>> {
        Self::casts_pending_enrichment(self, limit).await
    }

    async fn get_checkpoint(&self, name: &str) -> Result<Option<i64>> {
        Self::read_checkpoint(self, name).await
    }

    async fn set_checkpoint(&self, name: &str, value: i64) -> Result<()> {
        Self::write_checkpoint(self, name, value).await
    }

    async fn delete_checkpoint(&self, name: &str) -> Result<bool> {
        Self::clear_checkpoint(self, name).await
    }

    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>> {
        Self::all_checkpoints(self).await
    }

    async fn reaction_tallies(&self, since: Option<DateTime<Utc>>, scope: &TopScope) -> Result<Vec<ReactionTally>> {
        Self::tally_reactions(self, since, scope).await
    }

    async fn top_targets(&self, query: &TopQuery, now: DateTime<Utc>) -> Result<Vec<TopEntry>> {
        Self::top_reaction_targets(self, query, now).await
    }

    async fn subject_counts(
        &self,
        kind: SubjectKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SubjectCounts>> {
        Self::count_subject_activity(self, kind, start, end).await
    }
}

/// Fids are unsigned on the wire and `BIGINT` in the schema
pub(crate) fn fid_param(fid: u64) -> i64 {
    i64::try_from(fid).unwrap_or(i64::MAX)
}

pub(crate) fn fid_from_row(fid: i64) -> u64 {
    u64::try_from(fid).unwrap_or_default()
}
