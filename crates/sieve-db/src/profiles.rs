//! Profile repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

use sieve_core::{Error, Profile, ProfileRepository, ProfileUpdate, Result};

/// SQLite implementation of ProfileRepository.
#[derive(Clone)]
pub struct SqliteProfileRepository {
    pool: Pool<Sqlite>,
}

impl SqliteProfileRepository {
    /// Create a new SqliteProfileRepository with the given connection pool.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM profiles")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}

fn row_to_profile(row: &SqliteRow) -> Result<Profile> {
    let source_ids: String = row.try_get("source_ids")?;
    let manual_tags: String = row.try_get("manual_tags")?;
    Ok(Profile {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        source_ids: serde_json::from_str(&source_ids)?,
        manual_tags: serde_json::from_str(&manual_tags)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn write_profile<'e, E>(executor: E, profile: &Profile) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "UPDATE profiles SET name = ?, source_ids = ?, manual_tags = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&profile.name)
    .bind(serde_json::to_string(&profile.source_ids)?)
    .bind(serde_json::to_string(&profile.manual_tags)?)
    .bind(profile.updated_at)
    .bind(&profile.id)
    .execute(executor)
    .await
    .map_err(Error::Database)?;
    Ok(())
}

#[async_trait]
impl ProfileRepository for SqliteProfileRepository {
    async fn insert(&self, profile: &Profile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, name, source_ids, manual_tags, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.name)
        .bind(serde_json::to_string(&profile.source_ids)?)
        .bind(serde_json::to_string(&profile.manual_tags)?)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Profile>> {
        let row = sqlx::query(
            "SELECT id, name, source_ids, manual_tags, created_at, updated_at \
             FROM profiles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(row_to_profile).transpose()
    }

    async fn list(&self) -> Result<Vec<Profile>> {
        let rows = sqlx::query(
            "SELECT id, name, source_ids, manual_tags, created_at, updated_at \
             FROM profiles ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        rows.iter().map(row_to_profile).collect()
    }

    async fn update(&self, id: &str, update: &ProfileUpdate) -> Result<Profile> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(
            "SELECT id, name, source_ids, manual_tags, created_at, updated_at \
             FROM profiles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;
        let mut profile = match row {
            Some(row) => row_to_profile(&row)?,
            None => return Err(Error::ProfileNotFound(id.to_string())),
        };

        if let Some(name) = &update.name {
            profile.name = name.clone();
        }
        if let Some(source_ids) = &update.source_ids {
            profile.source_ids = source_ids.clone();
        }
        if let Some(manual_tags) = &update.manual_tags {
            profile.manual_tags = manual_tags.clone();
        }
        profile.updated_at = Utc::now();

        write_profile(&mut *tx, &profile).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(profile)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_source_refs(&self, source_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let rows = sqlx::query(
            "SELECT id, name, source_ids, manual_tags, created_at, updated_at FROM profiles",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let mut touched = 0u64;
        for row in &rows {
            let mut profile = row_to_profile(row)?;
            let before = profile.source_ids.len();
            profile.source_ids.retain(|s| s != source_id);
            if profile.source_ids.len() != before {
                profile.updated_at = Utc::now();
                write_profile(&mut *tx, &profile).await?;
                touched += 1;
            }
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(touched)
    }
}
