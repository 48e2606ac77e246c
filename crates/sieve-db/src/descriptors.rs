//! Descriptor repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

use sieve_core::{Descriptor, DescriptorRepository, Error, Result};

/// SQLite implementation of DescriptorRepository.
#[derive(Clone)]
pub struct SqliteDescriptorRepository {
    pool: Pool<Sqlite>,
}

impl SqliteDescriptorRepository {
    /// Create a new SqliteDescriptorRepository with the given connection pool.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Total descriptors across every source.
    pub async fn count_all(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM descriptors")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}

#[async_trait]
impl DescriptorRepository for SqliteDescriptorRepository {
    async fn insert_batch(&self, source_id: &str, descriptors: &[Descriptor]) -> Result<usize> {
        if descriptors.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let mut position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position), -1) FROM descriptors WHERE source_id = ?",
        )
        .bind(source_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let now = Utc::now();
        let mut inserted = 0usize;
        for descriptor in descriptors {
            position += 1;
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO descriptors
                    (source_id, id, position, title, alt, url, image_url, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(source_id)
            .bind(descriptor.identity())
            .bind(position)
            .bind(&descriptor.title)
            .bind(&descriptor.alt)
            .bind(&descriptor.url)
            .bind(descriptor.image_url.as_deref())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await.map_err(Error::Database)?;
        tracing::trace!(
            subsystem = "db",
            source_id,
            submitted = descriptors.len(),
            inserted,
            "Stored descriptor batch"
        );
        Ok(inserted)
    }

    async fn list_for_source(&self, source_id: &str) -> Result<Vec<Descriptor>> {
        let rows = sqlx::query(
            "SELECT id, title, alt, url, image_url FROM descriptors \
             WHERE source_id = ? ORDER BY position",
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| -> Result<Descriptor> {
                Ok(Descriptor {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    alt: row.try_get("alt")?,
                    url: row.try_get("url")?,
                    image_url: row.try_get("image_url")?,
                })
            })
            .collect()
    }

    async fn count_for_source(&self, source_id: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM descriptors WHERE source_id = ?")
            .bind(source_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}
