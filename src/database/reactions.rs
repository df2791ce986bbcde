//! Reactions and follow links
//!
//! Both tables are keyed by their natural tuple and share one policy: adds
//! create-skip, then revive tombstones older than the add; removes upsert a
//! deleted row when they are at least as new as what is stored.

use super::batch::dedup_latest;
use super::batch::push_typed_values;
use super::batch::push_values;
use super::batch::rows_per_chunk;
use super::fid_param;
use super::Database;
use crate::models::Link;
use crate::models::Reaction;
use crate::models::ReactionTarget;
use crate::Result;

const REACTION_PARAMS_PER_ROW: usize = 7; // fid, target_key, kind, target_fid, target_hash, target_url, timestamp
const LINK_PARAMS_PER_ROW: usize = 4; // fid, kind, target_fid, timestamp

fn reaction_insert(rows: usize, deleted: bool) -> String {
    let mut query = String::with_capacity(200 + rows * 40);
    query.push_str(
        "INSERT INTO reactions (fid, target_key, kind, target_fid, target_hash, target_url, timestamp, deleted) VALUES ",
    );
    // deleted is a literal so the row width stays at REACTION_PARAMS_PER_ROW
    let mut values = String::new();
    push_values(&mut values, rows, REACTION_PARAMS_PER_ROW);
    query.push_str(&values.replace(')', if deleted { ", TRUE)" } else { ", FALSE)" }));
    query
}

fn bind_reaction<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    reaction: &Reaction,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    let (target_fid, target_hash, target_url) = match &reaction.target {
        ReactionTarget::Cast(id) => (Some(fid_param(id.fid)), Some(id.hash.as_bytes().to_vec()), None),
        ReactionTarget::Url(url) => (None, None, Some(url.clone())),
    };
    q.bind(fid_param(reaction.fid))
        .bind(reaction.target.key())
        .bind(reaction.kind.as_str())
        .bind(target_fid)
        .bind(target_hash)
        .bind(target_url)
        .bind(reaction.timestamp)
}

impl Database {
    pub(super) async fn insert_reactions(&self, reactions: &[Reaction], chunk_size: usize) -> Result<u64> {
        if reactions.is_empty() {
            return Ok(0);
        }
        let deduped = dedup_latest(
            reactions,
            |r| (r.fid, r.target.key(), r.kind),
            |r| r.timestamp,
        );
        let mut written = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in deduped.chunks(rows_per_chunk(chunk_size, REACTION_PARAMS_PER_ROW)) {
            let mut query = reaction_insert(chunk.len(), false);
            query.push_str(" ON CONFLICT (fid, target_key, kind) DO NOTHING");
            let mut q = sqlx::query(&query);
            for reaction in chunk {
                q = bind_reaction(q, reaction);
            }
            written += q.execute(&mut *tx).await?.rows_affected();

            let mut undelete = String::from("UPDATE reactions r SET deleted = FALSE, timestamp = v.ts FROM (VALUES ");
            push_typed_values(&mut undelete, chunk.len(), &["bigint", "text", "text", "timestamptz"]);
            undelete.push_str(
                ") AS v(fid, target_key, kind, ts) \
                 WHERE r.fid = v.fid AND r.target_key = v.target_key AND r.kind = v.kind \
                 AND r.deleted AND r.timestamp < v.ts",
            );
            let mut q = sqlx::query(&undelete);
            for reaction in chunk {
                q = q
                    .bind(fid_param(reaction.fid))
                    .bind(reaction.target.key())
                    .bind(reaction.kind.as_str())
                    .bind(reaction.timestamp);
            }
            written += q.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        tracing::trace!("Wrote {} of {} reactions", written, reactions.len());
        Ok(written)
    }

    pub(super) async fn tombstone_reactions(&self, reactions: &[Reaction], chunk_size: usize) -> Result<u64> {
        if reactions.is_empty() {
            return Ok(0);
        }
        let deduped = dedup_latest(
            reactions,
            |r| (r.fid, r.target.key(), r.kind),
            |r| r.timestamp,
        );
        let mut written = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in deduped.chunks(rows_per_chunk(chunk_size, REACTION_PARAMS_PER_ROW)) {
            let mut query = reaction_insert(chunk.len(), true);
            query.push_str(
                " ON CONFLICT (fid, target_key, kind) DO UPDATE SET deleted = TRUE, timestamp = EXCLUDED.timestamp \
                 WHERE reactions.timestamp <= EXCLUDED.timestamp",
            );
            let mut q = sqlx::query(&query);
            for reaction in chunk {
                q = bind_reaction(q, reaction);
            }
            written += q.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    pub(super) async fn insert_links(&self, links: &[Link], chunk_size: usize) -> Result<u64> {
        if links.is_empty() {
            return Ok(0);
        }
        let deduped = dedup_latest(links, |l| (l.fid, l.kind.clone(), l.target_fid), |l| l.timestamp);
        let mut written = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in deduped.chunks(rows_per_chunk(chunk_size, LINK_PARAMS_PER_ROW)) {
            let mut query = String::with_capacity(120 + chunk.len() * 24);
            query.push_str("INSERT INTO links (fid, kind, target_fid, timestamp) VALUES ");
            push_values(&mut query, chunk.len(), LINK_PARAMS_PER_ROW);
            query.push_str(" ON CONFLICT (fid, kind, target_fid) DO NOTHING");
            let mut q = sqlx::query(&query);
            for link in chunk {
                q = q
                    .bind(fid_param(link.fid))
                    .bind(link.kind.clone())
                    .bind(fid_param(link.target_fid))
                    .bind(link.timestamp);
            }
            written += q.execute(&mut *tx).await?.rows_affected();

            let mut undelete = String::from("UPDATE links l SET deleted = FALSE, timestamp = v.ts FROM (VALUES ");
            push_typed_values(&mut undelete, chunk.len(), &["bigint", "text", "bigint", "timestamptz"]);
            undelete.push_str(
                ") AS v(fid, kind, target_fid, ts) \
                 WHERE l.fid = v.fid AND l.kind = v.kind AND l.target_fid = v.target_fid \
                 AND l.deleted AND l.timestamp < v.ts",
            );
            let mut q = sqlx::query(&undelete);
            for link in chunk {
                q = q
                    .bind(fid_param(link.fid))
                    .bind(link.kind.clone())
                    .bind(fid_param(link.target_fid))
                    .bind(link.timestamp);
            }
            written += q.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    pub(super) async fn tombstone_links(&self, links: &[Link], chunk_size: usize) -> Result<u64> {
        if links.is_empty() {
            return Ok(0);
        }
        let deduped = dedup_latest(links, |l| (l.fid, l.kind.clone(), l.target_fid), |l| l.timestamp);
        let mut written = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in deduped.chunks(rows_per_chunk(chunk_size, LINK_PARAMS_PER_ROW)) {
            let mut query = String::from("INSERT INTO links (fid, kind, target_fid, timestamp, deleted) VALUES ");
            let mut values = String::new();
            push_values(&mut values, chunk.len(), LINK_PARAMS_PER_ROW);
            query.push_str(&values.replace(')', ", TRUE)"));
            query.push_str(
                " ON CONFLICT (fid, kind, target_fid) DO UPDATE SET deleted = TRUE, timestamp = EXCLUDED.timestamp \
                 WHERE links.timestamp <= EXCLUDED.timestamp",
            );
            let mut q = sqlx::query(&query);
            for link in chunk {
                q = q
                    .bind(fid_param(link.fid))
                    .bind(link.kind.clone())
                    .bind(fid_param(link.target_fid))
                    .bind(link.timestamp);
            }
            written += q.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }
}
