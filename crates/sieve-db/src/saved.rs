//! Saved recommendation repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

use sieve_core::{Error, Result, SavedRecommendation, SavedRecommendationRepository};

/// SQLite implementation of SavedRecommendationRepository.
#[derive(Clone)]
pub struct SqliteSavedRepository {
    pool: Pool<Sqlite>,
}

impl SqliteSavedRepository {
    /// Create a new SqliteSavedRepository with the given connection pool.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM saved_recommendations")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}

#[async_trait]
impl SavedRecommendationRepository for SqliteSavedRepository {
    async fn save(&self, saved: &SavedRecommendation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO saved_recommendations (id, profile_id, item, saved_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                profile_id = excluded.profile_id,
                item = excluded.item,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(&saved.item.id)
        .bind(saved.item.profile_id.as_deref())
        .bind(serde_json::to_string(&saved.item)?)
        .bind(saved.saved_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn list(&self, profile_id: Option<&str>) -> Result<Vec<SavedRecommendation>> {
        let rows = match profile_id {
            Some(profile_id) => {
                sqlx::query(
                    "SELECT item, saved_at FROM saved_recommendations \
                     WHERE profile_id = ? ORDER BY saved_at DESC, id",
                )
                .bind(profile_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT item, saved_at FROM saved_recommendations ORDER BY saved_at DESC, id",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| -> Result<SavedRecommendation> {
                let item: String = row.try_get("item")?;
                Ok(SavedRecommendation {
                    item: serde_json::from_str(&item)?,
                    saved_at: row.try_get("saved_at")?,
                })
            })
            .collect()
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM saved_recommendations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
