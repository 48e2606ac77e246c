//! Generation side-store: in-flight markers and finished results per scope.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

use sieve_core::{Error, GenerationJob, GenerationJobStore, RecommendationItem, Result};

/// SQLite implementation of GenerationJobStore.
#[derive(Clone)]
pub struct SqliteGenerationStore {
    pool: Pool<Sqlite>,
}

impl SqliteGenerationStore {
    /// Create a new SqliteGenerationStore with the given connection pool.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GenerationJobStore for SqliteGenerationStore {
    async fn try_begin(&self, job: &GenerationJob, stale_before: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let purged = sqlx::query("DELETE FROM generation_jobs WHERE scope_key = ? AND started_at < ?")
            .bind(&job.scope_key)
            .bind(stale_before.timestamp_millis())
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        if purged.rows_affected() > 0 {
            tracing::info!(
                subsystem = "db",
                component = "generations",
                scope_key = %job.scope_key,
                "Discarded stale generation marker"
            );
        }

        let claimed = sqlx::query(
            "INSERT OR IGNORE INTO generation_jobs (scope_key, job, started_at) VALUES (?, ?, ?)",
        )
        .bind(&job.scope_key)
        .bind(serde_json::to_string(job)?)
        .bind(job.started_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(claimed.rows_affected() == 1)
    }

    async fn marker(&self, scope_key: &str) -> Result<Option<GenerationJob>> {
        let row = sqlx::query("SELECT job FROM generation_jobs WHERE scope_key = ?")
            .bind(scope_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        match row {
            Some(row) => {
                let job: String = row.try_get("job")?;
                Ok(Some(serde_json::from_str(&job)?))
            }
            None => Ok(None),
        }
    }

    async fn clear_marker(&self, job: &GenerationJob) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM generation_jobs WHERE scope_key = ? AND started_at = ?")
                .bind(&job.scope_key)
                .bind(job.started_at.timestamp_millis())
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete(
        &self,
        job: &GenerationJob,
        items: &[RecommendationItem],
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let released =
            sqlx::query("DELETE FROM generation_jobs WHERE scope_key = ? AND started_at = ?")
                .bind(&job.scope_key)
                .bind(job.started_at.timestamp_millis())
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        if released.rows_affected() == 0 {
            tx.rollback().await.map_err(Error::Database)?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO generation_results (scope_key, items, completed_at) VALUES (?, ?, ?)
            ON CONFLICT(scope_key) DO UPDATE SET
                items = excluded.items,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(&job.scope_key)
        .bind(serde_json::to_string(items)?)
        .bind(completed_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(true)
    }

    async fn result(
        &self,
        scope_key: &str,
    ) -> Result<Option<(Vec<RecommendationItem>, DateTime<Utc>)>> {
        let row = sqlx::query(
            "SELECT items, completed_at FROM generation_results WHERE scope_key = ?",
        )
        .bind(scope_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        match row {
            Some(row) => {
                let items: String = row.try_get("items")?;
                Ok(Some((serde_json::from_str(&items)?, row.try_get("completed_at")?)))
            }
            None => Ok(None),
        }
    }

    async fn clear_result(&self, scope_key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM generation_results WHERE scope_key = ?")
            .bind(scope_key)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
