use super::batch::dedup_latest;
use super::batch::push_values;
use super::batch::rows_per_chunk;
use super::fid_param;
use super::Database;
use crate::models::sanitize_text;
use crate::models::ProfileField;
use crate::models::Verification;
use crate::Result;

const PROFILE_PARAMS_PER_ROW: usize = 4; // fid, field, value, timestamp
const VERIFICATION_PARAMS_PER_ROW: usize = 4; // fid, address, protocol, timestamp

impl Database {
    pub(super) async fn write_profile_fields(&self, fields: &[ProfileField], chunk_size: usize) -> Result<u64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let deduped = dedup_latest(fields, |f| (f.fid, f.field.clone()), |f| f.timestamp);
        let mut written = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in deduped.chunks(rows_per_chunk(chunk_size, PROFILE_PARAMS_PER_ROW)) {
            let mut query = String::from("INSERT INTO profile_fields (fid, field, value, timestamp) VALUES ");
            push_values(&mut query, chunk.len(), PROFILE_PARAMS_PER_ROW);
            query.push_str(
                " ON CONFLICT (fid, field) DO UPDATE SET value = EXCLUDED.value, timestamp = EXCLUDED.timestamp \
                 WHERE profile_fields.timestamp < EXCLUDED.timestamp",
            );
            let mut q = sqlx::query(&query);
            for field in chunk {
                q = q
                    .bind(fid_param(field.fid))
                    .bind(field.field.clone())
                    .bind(sanitize_text(&field.value))
                    .bind(field.timestamp);
            }
            written += q.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    pub(super) async fn insert_verifications(&self, verifications: &[Verification], chunk_size: usize) -> Result<u64> {
        self.write_verifications(verifications, false, chunk_size).await
    }

    pub(super) async fn tombstone_verifications(&self, verifications: &[Verification], chunk_size: usize) -> Result<u64> {
        self.write_verifications(verifications, true, chunk_size).await
    }

    /// Adds revive only tombstones older than themselves; removes win ties
    async fn write_verifications(&self, verifications: &[Verification], deleted: bool, chunk_size: usize) -> Result<u64> {
        if verifications.is_empty() {
            return Ok(0);
        }
        let deduped = dedup_latest(verifications, |v| (v.fid, v.address.clone()), |v| v.timestamp);
        let conflict = if deleted {
            " ON CONFLICT (fid, address) DO UPDATE SET deleted = TRUE, timestamp = EXCLUDED.timestamp \
             WHERE verifications.timestamp <= EXCLUDED.timestamp"
        } else {
            " ON CONFLICT (fid, address) DO UPDATE SET deleted = FALSE, timestamp = EXCLUDED.timestamp, \
             protocol = EXCLUDED.protocol \
             WHERE verifications.deleted AND verifications.timestamp < EXCLUDED.timestamp"
        };
        let mut written = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in deduped.chunks(rows_per_chunk(chunk_size, VERIFICATION_PARAMS_PER_ROW)) {
            let mut query =
                String::from("INSERT INTO verifications (fid, address, protocol, timestamp, deleted) VALUES ");
            let mut values = String::new();
            push_values(&mut values, chunk.len(), VERIFICATION_PARAMS_PER_ROW);
            query.push_str(&values.replace(')', if deleted { ", TRUE)" } else { ", FALSE)" }));
            query.push_str(conflict);
            let mut q = sqlx::query(&query);
            for verification in chunk {
                q = q
                    .bind(fid_param(verification.fid))
                    .bind(verification.address.clone())
                    .bind(verification.protocol.clone())
                    .bind(verification.timestamp);
            }
            written += q.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }
}
