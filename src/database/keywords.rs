use std::collections::HashSet;

use super::batch::push_values;
use super::batch::rows_per_chunk;
use super::casts::CastRow;
use super::casts::CAST_COLUMNS;
use super::fid_param;
use super::Database;
use crate::models::Cast;
use crate::models::CastHash;
use crate::models::CastId;
use crate::models::Keyword;
use crate::Result;

const KEYWORD_PARAMS_PER_ROW: usize = 4; // cast_hash, fid, keyword, score

impl Database {
    pub(super) async fn enriched_hashes(&self, ids: &[CastId]) -> Result<HashSet<CastHash>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let hashes: Vec<Vec<u8>> = ids.iter().map(|id| id.hash.as_bytes().to_vec()).collect();
        let rows = sqlx::query_scalar::<_, Vec<u8>>(
            "SELECT cast_hash FROM cast_keywords WHERE cast_hash = ANY($1) \
             UNION SELECT cast_hash FROM keyword_runs WHERE cast_hash = ANY($1)",
        )
        .bind(&hashes)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|h| CastHash::from_bytes(h)).collect()
    }

    /// Insert keywords (duplicates skipped) and the processed marker together
    pub(super) async fn insert_keywords(&self, cast: &CastId, keywords: &[Keyword], chunk_size: usize) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for chunk in keywords.chunks(rows_per_chunk(chunk_size, KEYWORD_PARAMS_PER_ROW)) {
            let mut query = String::from("INSERT INTO cast_keywords (cast_hash, fid, keyword, score) VALUES ");
            push_values(&mut query, chunk.len(), KEYWORD_PARAMS_PER_ROW);
            query.push_str(" ON CONFLICT (cast_hash, keyword) DO NOTHING");
            let mut q = sqlx::query(&query);
            for keyword in chunk {
                q = q
                    .bind(cast.hash.as_bytes().to_vec())
                    .bind(fid_param(cast.fid))
                    .bind(keyword.keyword.clone())
                    .bind(keyword.score);
            }
            written += q.execute(&mut *tx).await?.rows_affected();
        }

        sqlx::query(
            "INSERT INTO keyword_runs (cast_hash, fid, processed_at, keyword_count) VALUES ($1, $2, NOW(), $3) \
             ON CONFLICT (cast_hash) DO UPDATE SET processed_at = NOW(), keyword_count = EXCLUDED.keyword_count",
        )
        .bind(cast.hash.as_bytes().to_vec())
        .bind(fid_param(cast.fid))
        .bind(i32::try_from(keywords.len()).unwrap_or(i32::MAX))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(written)
    }

    pub(super) async fn casts_pending_enrichment(&self, limit: usize) -> Result<Vec<Cast>> {
        let rows = sqlx::query_as::<_, CastRow>(&format!(
            "SELECT {CAST_COLUMNS} FROM casts c \
             WHERE NOT c.deleted \
             AND NOT EXISTS (SELECT 1 FROM cast_keywords k WHERE k.cast_hash = c.hash) \
             AND NOT EXISTS (SELECT 1 FROM keyword_runs r WHERE r.cast_hash = c.hash) \
             ORDER BY c.timestamp DESC LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Cast::try_from).collect()
    }
}
