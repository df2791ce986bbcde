//! Schema creation

use super::Database;
use crate::Result;

const SCHEMA: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS casts (
        hash BYTEA PRIMARY KEY,
        fid BIGINT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        text TEXT NOT NULL DEFAULT '',
        parent_fid BIGINT,
        parent_hash BYTEA,
        parent_url TEXT,
        top_fid BIGINT NOT NULL,
        top_hash BYTEA NOT NULL,
        top_channel_url TEXT,
        deleted BOOLEAN NOT NULL DEFAULT FALSE,
        deleted_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CHECK (parent_hash IS NULL OR parent_url IS NULL)
    )",
    "CREATE INDEX IF NOT EXISTS idx_casts_fid_timestamp ON casts (fid, timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_casts_timestamp ON casts (timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_casts_parent_hash ON casts (parent_hash) WHERE parent_hash IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_casts_top_hash ON casts (top_hash)",
    "CREATE INDEX IF NOT EXISTS idx_casts_top_channel_url ON casts (top_channel_url) WHERE top_channel_url IS NOT NULL",
    r"CREATE TABLE IF NOT EXISTS cast_mentions (
        cast_hash BYTEA NOT NULL,
        fid BIGINT NOT NULL,
        mentioned_fid BIGINT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (cast_hash, mentioned_fid, position)
    )",
    "CREATE INDEX IF NOT EXISTS idx_cast_mentions_mentioned ON cast_mentions (mentioned_fid)",
    r"CREATE TABLE IF NOT EXISTS url_embeds (
        cast_hash BYTEA NOT NULL,
        fid BIGINT NOT NULL,
        url TEXT NOT NULL,
        host TEXT,
        path TEXT,
        query TEXT,
        content_type TEXT,
        content_metadata JSONB,
        parsed_from_text BOOLEAN NOT NULL DEFAULT FALSE,
        deleted BOOLEAN NOT NULL DEFAULT FALSE,
        PRIMARY KEY (cast_hash, url)
    )",
    "CREATE INDEX IF NOT EXISTS idx_url_embeds_url ON url_embeds (url)",
    "CREATE INDEX IF NOT EXISTS idx_url_embeds_host ON url_embeds (host)",
    r"CREATE TABLE IF NOT EXISTS cast_embeds (
        cast_hash BYTEA NOT NULL,
        fid BIGINT NOT NULL,
        embedded_fid BIGINT NOT NULL,
        embedded_hash BYTEA NOT NULL,
        PRIMARY KEY (cast_hash, embedded_hash)
    )",
    "CREATE INDEX IF NOT EXISTS idx_cast_embeds_embedded ON cast_embeds (embedded_hash)",
    r"CREATE TABLE IF NOT EXISTS reactions (
        fid BIGINT NOT NULL,
        target_key TEXT NOT NULL,
        kind TEXT NOT NULL,
        target_fid BIGINT,
        target_hash BYTEA,
        target_url TEXT,
        timestamp TIMESTAMPTZ NOT NULL,
        deleted BOOLEAN NOT NULL DEFAULT FALSE,
        PRIMARY KEY (fid, target_key, kind),
        CHECK ((target_hash IS NULL) <> (target_url IS NULL))
    )",
    "CREATE INDEX IF NOT EXISTS idx_reactions_target_hash ON reactions (target_hash) WHERE target_hash IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_reactions_timestamp ON reactions (timestamp DESC)",
    r"CREATE TABLE IF NOT EXISTS links (
        fid BIGINT NOT NULL,
        kind TEXT NOT NULL,
        target_fid BIGINT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        deleted BOOLEAN NOT NULL DEFAULT FALSE,
        PRIMARY KEY (fid, kind, target_fid)
    )",
    "CREATE INDEX IF NOT EXISTS idx_links_target_fid ON links (target_fid)",
    r"CREATE TABLE IF NOT EXISTS profile_fields (
        fid BIGINT NOT NULL,
        field TEXT NOT NULL,
        value TEXT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (fid, field)
    )",
    r"CREATE TABLE IF NOT EXISTS verifications (
        fid BIGINT NOT NULL,
        address TEXT NOT NULL,
        protocol TEXT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        deleted BOOLEAN NOT NULL DEFAULT FALSE,
        PRIMARY KEY (fid, address)
    )",
    r"CREATE TABLE IF NOT EXISTS cast_keywords (
        cast_hash BYTEA NOT NULL,
        fid BIGINT NOT NULL,
        keyword TEXT NOT NULL,
        score DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (cast_hash, keyword)
    )",
    "CREATE INDEX IF NOT EXISTS idx_cast_keywords_keyword ON cast_keywords (keyword)",
    r"CREATE TABLE IF NOT EXISTS keyword_runs (
        cast_hash BYTEA PRIMARY KEY,
        fid BIGINT NOT NULL,
        processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        keyword_count INTEGER NOT NULL
    )",
    r"CREATE TABLE IF NOT EXISTS checkpoints (
        name TEXT PRIMARY KEY,
        value BIGINT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
];

impl Database {
    /// Create tables and indexes; safe to run repeatedly
    ///
    /// # Errors
    /// Returns an error if any DDL statement fails
    pub async fn init_schema(&self) -> Result<()> {
        tracing::info!("Initializing database schema ({} statements)", SCHEMA.len());
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::info!("Database schema ready");
        Ok(())
    }
}
