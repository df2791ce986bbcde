#![allow(clippy::cast_possible_truncation)] // Batch sizes won't exceed u32::MAX

use chrono::DateTime;
use chrono::Utc;

use super::batch::dedup_latest;
use super::batch::push_typed_values;
use super::batch::push_values;
use super::batch::rows_per_chunk;
use super::fid_from_row;
use super::fid_param;
use super::CastWriteSummary;
use super::Database;
use crate::models::sanitize_text;
use crate::models::Cast;
use crate::models::CastHash;
use crate::models::CastId;
use crate::models::CastRecord;
use crate::models::ParentRef;
use crate::models::TopAncestor;
use crate::Result;

pub(super) const CAST_COLUMNS: &str = "c.hash, c.fid, c.timestamp, c.text, c.parent_fid, c.parent_hash, c.parent_url, \
     c.top_fid, c.top_hash, c.top_channel_url, c.deleted, c.deleted_at";

const CAST_PARAMS_PER_ROW: usize = 10; // hash, fid, timestamp, text, parent_fid, parent_hash, parent_url, top_fid, top_hash, top_channel_url
const MENTION_PARAMS_PER_ROW: usize = 4; // cast_hash, fid, mentioned_fid, position
const URL_EMBED_PARAMS_PER_ROW: usize = 9; // cast_hash, fid, url, host, path, query, content_type, content_metadata, parsed_from_text
const CAST_EMBED_PARAMS_PER_ROW: usize = 4; // cast_hash, fid, embedded_fid, embedded_hash

const SLOW_FLUSH_MS: u128 = 5000;

#[derive(Debug, sqlx::FromRow)]
pub(super) struct CastRow {
    hash: Vec<u8>,
    fid: i64,
    timestamp: DateTime<Utc>,
    text: String,
    parent_fid: Option<i64>,
    parent_hash: Option<Vec<u8>>,
    parent_url: Option<String>,
    top_fid: i64,
    top_hash: Vec<u8>,
    top_channel_url: Option<String>,
    deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<CastRow> for Cast {
    type Error = crate::CastfeedError;

    fn try_from(row: CastRow) -> Result<Self> {
        let parent = match (row.parent_fid, row.parent_hash, row.parent_url) {
            (Some(fid), Some(hash), _) => Some(ParentRef::Cast(CastId::new(
                fid_from_row(fid),
                CastHash::from_bytes(&hash)?,
            ))),
            (_, _, Some(url)) => Some(ParentRef::Url(url)),
            _ => None,
        };
        Ok(Self {
            id: CastId::new(fid_from_row(row.fid), CastHash::from_bytes(&row.hash)?),
            timestamp: row.timestamp,
            text: row.text,
            parent,
            top: Some(TopAncestor {
                id: CastId::new(fid_from_row(row.top_fid), CastHash::from_bytes(&row.top_hash)?),
                channel_url: row.top_channel_url,
            }),
            deleted: row.deleted,
            deleted_at: row.deleted_at,
        })
    }
}

/// Casts are written with their resolved top; an unresolved one is its own root
fn top_or_self(cast: &Cast) -> TopAncestor {
    cast.top.clone().unwrap_or_else(|| TopAncestor {
        id: cast.id.clone(),
        channel_url: cast.parent_url().map(str::to_string),
    })
}

impl Database {
    /// Write a batch of casts, mentions and embeds in one transaction
    ///
    /// Existing casts are left untouched, except that a soft-deleted cast is
    /// revived when the incoming add is strictly newer than its removal.
    pub(super) async fn upsert_cast_records(
        &self,
        records: &[CastRecord],
        chunk_size: usize,
    ) -> Result<CastWriteSummary> {
        if records.is_empty() {
            return Ok(CastWriteSummary::default());
        }
        let start = std::time::Instant::now();
        let deduped = dedup_latest(records, |r| r.cast.id.hash.clone(), |r| r.cast.timestamp);

        let mut summary = CastWriteSummary::default();
        let mut tx = self.pool.begin().await?;

        for chunk in deduped.chunks(rows_per_chunk(chunk_size, CAST_PARAMS_PER_ROW)) {
            let mut query = String::with_capacity(200 + chunk.len() * 80);
            query.push_str(
                "INSERT INTO casts (hash, fid, timestamp, text, parent_fid, parent_hash, parent_url, top_fid, top_hash, top_channel_url) VALUES ",
            );
            push_values(&mut query, chunk.len(), CAST_PARAMS_PER_ROW);
            query.push_str(" ON CONFLICT (hash) DO NOTHING");

            let mut q = sqlx::query(&query);
            for record in chunk {
                let cast = &record.cast;
                let top = top_or_self(cast);
                let parent = cast.parent_cast();
                q = q
                    .bind(cast.id.hash.as_bytes().to_vec())
                    .bind(fid_param(cast.id.fid))
                    .bind(cast.timestamp)
                    .bind(sanitize_text(&cast.text))
                    .bind(parent.map(|p| fid_param(p.fid)))
                    .bind(parent.map(|p| p.hash.as_bytes().to_vec()))
                    .bind(cast.parent_url().map(str::to_string))
                    .bind(fid_param(top.id.fid))
                    .bind(top.id.hash.as_bytes().to_vec())
                    .bind(top.channel_url);
            }
            summary.inserted += q.execute(&mut *tx).await?.rows_affected();

            let mut undelete =
                String::from("UPDATE casts c SET deleted = FALSE, deleted_at = NULL FROM (VALUES ");
            push_typed_values(&mut undelete, chunk.len(), &["bytea", "timestamptz"]);
            undelete.push_str(
                ") AS v(hash, ts) WHERE c.hash = v.hash AND c.deleted AND c.deleted_at < v.ts RETURNING c.hash",
            );
            let mut q = sqlx::query_scalar::<_, Vec<u8>>(&undelete);
            for record in chunk {
                q = q
                    .bind(record.cast.id.hash.as_bytes().to_vec())
                    .bind(record.cast.timestamp);
            }
            let revived = q.fetch_all(&mut *tx).await?;
            if !revived.is_empty() {
                sqlx::query("UPDATE url_embeds SET deleted = FALSE WHERE cast_hash = ANY($1)")
                    .bind(&revived)
                    .execute(&mut *tx)
                    .await?;
                tracing::debug!("Revived {} soft-deleted casts", revived.len());
                summary.undeleted += revived.len() as u64;
            }
        }

        let mentions: Vec<_> = deduped.iter().flat_map(|r| &r.mentions).collect();
        for chunk in mentions.chunks(rows_per_chunk(chunk_size, MENTION_PARAMS_PER_ROW)) {
            let mut query = String::with_capacity(120 + chunk.len() * 24);
            query.push_str("INSERT INTO cast_mentions (cast_hash, fid, mentioned_fid, position) VALUES ");
            push_values(&mut query, chunk.len(), MENTION_PARAMS_PER_ROW);
            query.push_str(" ON CONFLICT DO NOTHING");

            let mut q = sqlx::query(&query);
            for mention in chunk {
                q = q
                    .bind(mention.cast.hash.as_bytes().to_vec())
                    .bind(fid_param(mention.cast.fid))
                    .bind(fid_param(mention.mentioned_fid))
                    .bind(i32::try_from(mention.position).unwrap_or(i32::MAX));
            }
            q.execute(&mut *tx).await?;
        }

        let url_embeds: Vec<_> = deduped.iter().flat_map(|r| &r.url_embeds).collect();
        for chunk in url_embeds.chunks(rows_per_chunk(chunk_size, URL_EMBED_PARAMS_PER_ROW)) {
            let mut query = String::with_capacity(200 + chunk.len() * 48);
            query.push_str(
                "INSERT INTO url_embeds (cast_hash, fid, url, host, path, query, content_type, content_metadata, parsed_from_text) VALUES ",
            );
            push_values(&mut query, chunk.len(), URL_EMBED_PARAMS_PER_ROW);
            query.push_str(" ON CONFLICT DO NOTHING");

            let mut q = sqlx::query(&query);
            for embed in chunk {
                q = q
                    .bind(embed.cast.hash.as_bytes().to_vec())
                    .bind(fid_param(embed.cast.fid))
                    .bind(sanitize_text(&embed.url))
                    .bind(embed.host.clone())
                    .bind(embed.path.clone())
                    .bind(embed.query.clone())
                    .bind(embed.content_type.clone())
                    .bind(embed.content_metadata.clone())
                    .bind(embed.parsed_from_text);
            }
            q.execute(&mut *tx).await?;
        }

        let cast_embeds: Vec<_> = deduped.iter().flat_map(|r| &r.cast_embeds).collect();
        for chunk in cast_embeds.chunks(rows_per_chunk(chunk_size, CAST_EMBED_PARAMS_PER_ROW)) {
            let mut query = String::with_capacity(120 + chunk.len() * 24);
            query.push_str("INSERT INTO cast_embeds (cast_hash, fid, embedded_fid, embedded_hash) VALUES ");
            push_values(&mut query, chunk.len(), CAST_EMBED_PARAMS_PER_ROW);
            query.push_str(" ON CONFLICT DO NOTHING");

            let mut q = sqlx::query(&query);
            for embed in chunk {
                q = q
                    .bind(embed.cast.hash.as_bytes().to_vec())
                    .bind(fid_param(embed.cast.fid))
                    .bind(fid_param(embed.embedded.fid))
                    .bind(embed.embedded.hash.as_bytes().to_vec());
            }
            q.execute(&mut *tx).await?;
        }

        tx.commit().await?;

        let elapsed = start.elapsed();
        tracing::trace!(
            "Flushed {} casts ({} new, {} revived), {} mentions, {} url embeds, {} cast embeds in {:?}",
            deduped.len(),
            summary.inserted,
            summary.undeleted,
            mentions.len(),
            url_embeds.len(),
            cast_embeds.len(),
            elapsed
        );
        if elapsed.as_millis() > SLOW_FLUSH_MS {
            tracing::warn!("Slow cast flush: {} casts took {:?}", deduped.len(), elapsed);
        }

        Ok(summary)
    }

    pub(super) async fn get_casts_by_id(&self, ids: &[CastId]) -> Result<Vec<Cast>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let hashes: Vec<Vec<u8>> = ids.iter().map(|id| id.hash.as_bytes().to_vec()).collect();
        let rows = sqlx::query_as::<_, CastRow>(&format!(
            "SELECT {CAST_COLUMNS} FROM casts c WHERE c.hash = ANY($1)"
        ))
        .bind(&hashes)
        .fetch_all(&self.pool)
        .await?;

        let mut casts = Vec::with_capacity(rows.len());
        for row in rows {
            let cast = Cast::try_from(row)?;
            // Hashes are unique, but a reference with the wrong author is not this cast
            if ids.contains(&cast.id) {
                casts.push(cast);
            }
        }
        Ok(casts)
    }

    /// Mark a cast and its URL embeds deleted
    ///
    /// Applies only when the remove is at least as new as the cast.
    pub(super) async fn soft_delete_cast(&self, id: &CastId, removed_at: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let affected = sqlx::query(
            "UPDATE casts SET deleted = TRUE, deleted_at = $3 \
             WHERE hash = $1 AND fid = $2 AND NOT deleted AND timestamp <= $3",
        )
        .bind(id.hash.as_bytes().to_vec())
        .bind(fid_param(id.fid))
        .bind(removed_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if affected > 0 {
            sqlx::query("UPDATE url_embeds SET deleted = TRUE WHERE cast_hash = $1")
                .bind(id.hash.as_bytes().to_vec())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(affected > 0)
    }
}
