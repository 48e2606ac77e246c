//! Source repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

use sieve_core::{
    Error, ProductIdea, Result, Source, SourceError, SourceMeta, SourceRepository, TagGraph,
};

const SOURCE_COLUMNS: &str = "id, name, label, url, item_count, enabled, graph, visual_ideas, \
     updated_at, analyzed_at, last_error, last_error_at";

/// SQLite implementation of SourceRepository.
#[derive(Clone)]
pub struct SqliteSourceRepository {
    pool: Pool<Sqlite>,
}

impl SqliteSourceRepository {
    /// Create a new SqliteSourceRepository with the given connection pool.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Number of sources with at least one successful analysis.
    pub async fn count_analyzed(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM sources WHERE analyzed_at IS NOT NULL")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}

fn row_to_source(row: &SqliteRow) -> Result<Source> {
    let graph: String = row.try_get("graph")?;
    let visual_ideas: String = row.try_get("visual_ideas")?;
    let last_error: Option<String> = row.try_get("last_error")?;
    let last_error_at: Option<DateTime<Utc>> = row.try_get("last_error_at")?;

    Ok(Source {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        label: row.try_get("label")?,
        url: row.try_get("url")?,
        item_count: row.try_get("item_count")?,
        enabled: row.try_get("enabled")?,
        graph: serde_json::from_str(&graph)?,
        visual_ideas: serde_json::from_str(&visual_ideas)?,
        updated_at: row.try_get("updated_at")?,
        analyzed_at: row.try_get("analyzed_at")?,
        last_error: match (last_error, last_error_at) {
            (Some(message), Some(at)) => Some(SourceError { message, at }),
            _ => None,
        },
    })
}

#[async_trait]
impl SourceRepository for SqliteSourceRepository {
    async fn upsert(&self, id: &str, meta: &SourceMeta) -> Result<Source> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO sources (id, name, label, url, updated_at)
            VALUES (?1, ?2, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(&meta.name)
        .bind(&meta.url)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.get(id)
            .await?
            .ok_or_else(|| Error::NoSuchSource(id.to_string()))
    }

    async fn get(&self, id: &str) -> Result<Option<Source>> {
        let sql = format!("SELECT {} FROM sources WHERE id = ?", SOURCE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(row_to_source).transpose()
    }

    async fn list(&self) -> Result<Vec<Source>> {
        let sql = format!("SELECT {} FROM sources ORDER BY id", SOURCE_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(row_to_source).collect()
    }

    async fn store_analysis(
        &self,
        id: &str,
        graph: &TagGraph,
        visual_ideas: &[ProductIdea],
        analyzed_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sources SET
                graph = ?, visual_ideas = ?, analyzed_at = ?, updated_at = ?,
                last_error = NULL, last_error_at = NULL
            WHERE id = ?
            "#,
        )
        .bind(serde_json::to_string(graph)?)
        .bind(serde_json::to_string(visual_ideas)?)
        .bind(analyzed_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NoSuchSource(id.to_string()));
        }
        Ok(())
    }

    async fn set_item_count(&self, id: &str, count: i64) -> Result<()> {
        sqlx::query("UPDATE sources SET item_count = ?, updated_at = ? WHERE id = ?")
            .bind(count)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE sources SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_label(&self, id: &str, label: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE sources SET label = ?, updated_at = ? WHERE id = ?")
            .bind(label)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_error(&self, id: &str, message: &str) -> Result<()> {
        sqlx::query("UPDATE sources SET last_error = ?, last_error_at = ? WHERE id = ?")
            .bind(message)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("DELETE FROM descriptors WHERE source_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let result = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
