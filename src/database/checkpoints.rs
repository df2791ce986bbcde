use super::Checkpoint;
use super::Database;
use crate::Result;

impl Database {
    pub(super) async fn read_checkpoint(&self, name: &str) -> Result<Option<i64>> {
        let value = sqlx::query_scalar::<_, i64>("SELECT value FROM checkpoints WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub(super) async fn write_checkpoint(&self, name: &str, value: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO checkpoints (name, value, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;
        tracing::debug!("Checkpoint {name} = {value}");
        Ok(())
    }

    pub(super) async fn clear_checkpoint(&self, name: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM checkpoints WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    pub(super) async fn all_checkpoints(&self) -> Result<Vec<Checkpoint>> {
        let rows = sqlx::query_as::<_, (String, i64, chrono::DateTime<chrono::Utc>)>(
            "SELECT name, value, updated_at FROM checkpoints ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, value, updated_at)| Checkpoint {
                name,
                value,
                updated_at,
            })
            .collect())
    }
}
