//! Master graph cache storage.

use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

use sieve_core::{Error, MasterGraph, MasterGraphRepository, Result};

const MASTER_KEY: &str = "master";

/// SQLite implementation of MasterGraphRepository.
#[derive(Clone)]
pub struct SqliteMasterGraphRepository {
    pool: Pool<Sqlite>,
}

impl SqliteMasterGraphRepository {
    /// Create a new SqliteMasterGraphRepository with the given connection pool.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MasterGraphRepository for SqliteMasterGraphRepository {
    async fn get(&self) -> Result<Option<MasterGraph>> {
        let row = sqlx::query("SELECT graph, source_ids, updated_at FROM master_graph WHERE key = ?")
            .bind(MASTER_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let graph: String = row.try_get("graph")?;
        let source_ids: String = row.try_get("source_ids")?;
        Ok(Some(MasterGraph {
            graph: serde_json::from_str(&graph)?,
            source_ids: serde_json::from_str(&source_ids)?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn put(&self, master: &MasterGraph) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO master_graph (key, graph, source_ids, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                graph = excluded.graph,
                source_ids = excluded.source_ids,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(MASTER_KEY)
        .bind(serde_json::to_string(&master.graph)?)
        .bind(serde_json::to_string(&master.source_ids)?)
        .bind(master.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
