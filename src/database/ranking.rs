//! Aggregation queries behind the ranking engine

use chrono::DateTime;
use chrono::Utc;

use super::fid_from_row;
use super::fid_param;
use super::Database;
use crate::models::CastHash;
use crate::models::CastId;
use crate::ranking::Metric;
use crate::ranking::ReactionTally;
use crate::ranking::SubjectCounts;
use crate::ranking::SubjectKind;
use crate::ranking::TopEntry;
use crate::ranking::TopQuery;
use crate::ranking::TopScope;
use crate::Result;

/// Extra predicate for a scope; binds at most one parameter as `$2`
fn scope_clause(scope: &TopScope) -> &'static str {
    match scope {
        TopScope::Global => "",
        TopScope::Author(_) => " AND r.target_fid = $2",
        TopScope::AuthorReplies(_) => " AND r.target_fid = $2 AND c.parent_hash IS NOT NULL",
        TopScope::Channel(_) => " AND c.top_channel_url = $2",
    }
}

fn bind_scope<'q, O>(
    q: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    scope: &TopScope,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    match scope {
        TopScope::Global => q,
        TopScope::Author(fid) | TopScope::AuthorReplies(fid) => q.bind(fid_param(*fid)),
        TopScope::Channel(url) => q.bind(url.clone()),
    }
}

const fn metric_clause(metric: Metric) -> &'static str {
    match metric {
        Metric::Likes => " AND r.kind = 'like'",
        Metric::Recasts => " AND r.kind = 'recast'",
        Metric::Reactions => "",
    }
}

// Reactions on live casts; a target we never stored still counts
const REACTION_BASE: &str = "FROM reactions r LEFT JOIN casts c ON c.hash = r.target_hash \
     WHERE NOT r.deleted AND r.target_hash IS NOT NULL AND (c.hash IS NULL OR NOT c.deleted) \
     AND r.timestamp >= $1";

fn cast_id(fid: i64, hash: &[u8]) -> Result<CastId> {
    Ok(CastId::new(fid_from_row(fid), CastHash::from_bytes(hash)?))
}

fn activity_query(kind: SubjectKind) -> &'static str {
    match kind {
        SubjectKind::Author => {
            "SELECT c.fid::text AS subject, (c.parent_hash IS NULL)::int AS posts, \
             (c.parent_hash IS NOT NULL)::int AS replies, 0 AS likes, 0 AS recasts \
             FROM casts c WHERE NOT c.deleted AND c.timestamp >= $1 AND c.timestamp < $2 \
             UNION ALL \
             SELECT r.target_fid::text, 0, 0, (r.kind = 'like')::int, (r.kind = 'recast')::int \
             FROM reactions r WHERE NOT r.deleted AND r.target_fid IS NOT NULL \
             AND r.timestamp >= $1 AND r.timestamp < $2"
        }
        SubjectKind::Channel => {
            "SELECT c.top_channel_url AS subject, (c.parent_hash IS NULL)::int AS posts, \
             (c.parent_hash IS NOT NULL)::int AS replies, 0 AS likes, 0 AS recasts \
             FROM casts c WHERE NOT c.deleted AND c.top_channel_url IS NOT NULL \
             AND c.timestamp >= $1 AND c.timestamp < $2 \
             UNION ALL \
             SELECT c.top_channel_url, 0, 0, (r.kind = 'like')::int, (r.kind = 'recast')::int \
             FROM reactions r JOIN casts c ON c.hash = r.target_hash \
             WHERE NOT r.deleted AND NOT c.deleted AND c.top_channel_url IS NOT NULL \
             AND r.timestamp >= $1 AND r.timestamp < $2"
        }
        SubjectKind::Cast => {
            "SELECT e.embedded_fid::text || ':0x' || encode(e.embedded_hash, 'hex') AS subject, \
             1 AS posts, 0 AS replies, 0 AS likes, 0 AS recasts \
             FROM cast_embeds e JOIN casts c ON c.hash = e.cast_hash \
             WHERE NOT c.deleted AND c.timestamp >= $1 AND c.timestamp < $2 \
             UNION ALL \
             SELECT c.parent_fid::text || ':0x' || encode(c.parent_hash, 'hex'), 0, 1, 0, 0 \
             FROM casts c WHERE NOT c.deleted AND c.parent_hash IS NOT NULL \
             AND c.timestamp >= $1 AND c.timestamp < $2 \
             UNION ALL \
             SELECT r.target_key, 0, 0, (r.kind = 'like')::int, (r.kind = 'recast')::int \
             FROM reactions r WHERE NOT r.deleted AND r.target_hash IS NOT NULL \
             AND r.timestamp >= $1 AND r.timestamp < $2"
        }
        SubjectKind::Url => {
            "SELECT u.url AS subject, 1 AS posts, 0 AS replies, 0 AS likes, 0 AS recasts \
             FROM url_embeds u JOIN casts c ON c.hash = u.cast_hash \
             WHERE NOT u.deleted AND NOT c.deleted AND c.timestamp >= $1 AND c.timestamp < $2 \
             UNION ALL \
             SELECT u.url, 0, 1, 0, 0 \
             FROM casts c JOIN url_embeds u ON u.cast_hash = c.parent_hash \
             WHERE NOT c.deleted AND NOT u.deleted AND c.timestamp >= $1 AND c.timestamp < $2 \
             UNION ALL \
             SELECT u.url, 0, 0, (r.kind = 'like')::int, (r.kind = 'recast')::int \
             FROM reactions r JOIN url_embeds u ON u.cast_hash = r.target_hash \
             WHERE NOT r.deleted AND NOT u.deleted AND r.timestamp >= $1 AND r.timestamp < $2 \
             UNION ALL \
             SELECT r.target_url, 0, 0, (r.kind = 'like')::int, (r.kind = 'recast')::int \
             FROM reactions r WHERE NOT r.deleted AND r.target_url IS NOT NULL \
             AND r.timestamp >= $1 AND r.timestamp < $2"
        }
    }
}

impl Database {
    pub(super) async fn tally_reactions(
        &self,
        since: Option<DateTime<Utc>>,
        scope: &TopScope,
    ) -> Result<Vec<ReactionTally>> {
        let sql = format!(
            "SELECT r.target_fid, r.target_hash, \
             COUNT(*) FILTER (WHERE r.kind = 'like') AS likes, \
             COUNT(*) FILTER (WHERE r.kind = 'recast') AS recasts, \
             MIN(r.timestamp) AS earliest \
             {REACTION_BASE}{} GROUP BY r.target_fid, r.target_hash",
            scope_clause(scope)
        );
        let q = sqlx::query_as::<_, (i64, Vec<u8>, i64, i64, DateTime<Utc>)>(&sql)
            .bind(since.unwrap_or_default());
        let rows = bind_scope(q, scope).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|(fid, hash, likes, recasts, earliest)| {
                Ok(ReactionTally {
                    target: cast_id(fid, &hash)?,
                    likes: u64::try_from(likes).unwrap_or_default(),
                    recasts: u64::try_from(recasts).unwrap_or_default(),
                    earliest,
                })
            })
            .collect()
    }

    pub(super) async fn top_reaction_targets(&self, query: &TopQuery, now: DateTime<Utc>) -> Result<Vec<TopEntry>> {
        let param_base = if matches!(query.scope, TopScope::Global) { 2 } else { 3 };
        let sql = format!(
            "SELECT r.target_fid, r.target_hash, COUNT(*) AS n \
             {REACTION_BASE}{}{} GROUP BY r.target_fid, r.target_hash \
             ORDER BY n DESC, r.target_fid DESC, r.target_hash ASC LIMIT ${} OFFSET ${}",
            scope_clause(&query.scope),
            metric_clause(query.metric),
            param_base,
            param_base + 1
        );
        let q = sqlx::query_as::<_, (i64, Vec<u8>, i64)>(&sql).bind(query.window.since(now).unwrap_or_default());
        let rows = bind_scope(q, &query.scope)
            .bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(query.offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(fid, hash, n)| {
                Ok(TopEntry {
                    target: cast_id(fid, &hash)?,
                    count: u64::try_from(n).unwrap_or_default(),
                })
            })
            .collect()
    }

    pub(super) async fn count_subject_activity(
        &self,
        kind: SubjectKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SubjectCounts>> {
        let sql = format!(
            "SELECT subject, SUM(posts)::bigint, SUM(replies)::bigint, SUM(likes)::bigint, SUM(recasts)::bigint \
             FROM ({}) activity WHERE subject IS NOT NULL GROUP BY subject",
            activity_query(kind)
        );
        let rows = sqlx::query_as::<_, (String, i64, i64, i64, i64)>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(subject, posts, replies, likes, recasts)| SubjectCounts {
                subject,
                posts: u64::try_from(posts).unwrap_or_default(),
                replies: u64::try_from(replies).unwrap_or_default(),
                likes: u64::try_from(likes).unwrap_or_default(),
                recasts: u64::try_from(recasts).unwrap_or_default(),
            })
            .collect())
    }
}
