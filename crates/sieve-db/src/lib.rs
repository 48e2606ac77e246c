//! # sieve-db
//!
//! SQLite persistence for sieve.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for sources, descriptors, profiles,
//!   the master graph cache and saved recommendations
//! - The generation side-store shared by every process using the file
//!
//! ## Example
//!
//! ```rust,ignore
//! use sieve_db::{Database, SourceRepository};
//!
//! let db = Database::connect("sqlite://sieve.db?mode=rwc").await?;
//! db.migrate().await?;
//! for source in db.sources.list().await? {
//!     println!("{} ({} items)", source.label, source.item_count);
//! }
//! ```

pub mod descriptors;
pub mod generations;
pub mod master;
pub mod pool;
pub mod profiles;
pub mod saved;
pub mod settings;
pub mod sources;

pub use descriptors::SqliteDescriptorRepository;
pub use generations::SqliteGenerationStore;
pub use master::SqliteMasterGraphRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use profiles::SqliteProfileRepository;
pub use saved::SqliteSavedRepository;
pub use settings::SqliteSettingsStore;
pub use sources::SqliteSourceRepository;

// Re-export core types
pub use sieve_core::*;

use sqlx::{Pool, Sqlite};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: Pool<Sqlite>,
    pub sources: SqliteSourceRepository,
    pub descriptors: SqliteDescriptorRepository,
    pub profiles: SqliteProfileRepository,
    pub master: SqliteMasterGraphRepository,
    pub saved: SqliteSavedRepository,
    /// In-flight markers and finished results for recommendation runs.
    pub generations: SqliteGenerationStore,
    pub settings: SqliteSettingsStore,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            sources: SqliteSourceRepository::new(pool.clone()),
            descriptors: SqliteDescriptorRepository::new(pool.clone()),
            profiles: SqliteProfileRepository::new(pool.clone()),
            master: SqliteMasterGraphRepository::new(pool.clone()),
            saved: SqliteSavedRepository::new(pool.clone()),
            generations: SqliteGenerationStore::new(pool.clone()),
            settings: SqliteSettingsStore::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Fresh, migrated, private in-memory database.
    pub async fn connect_memory() -> Result<Self> {
        let db = Self::connect("sqlite::memory:").await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Store-wide counts.
    pub async fn stats(&self) -> Result<Stats> {
        let source_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(Stats {
            source_count,
            item_count: self.descriptors.count_all().await?,
            analyzed_sources: self.sources.count_analyzed().await?,
            profile_count: self.profiles.count().await?,
            saved_count: self.saved.count().await?,
            master_updated_at: self.master.get().await?.map(|m| m.updated_at),
        })
    }

    /// Delete every stored record.
    pub async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        for table in [
            "descriptors",
            "sources",
            "profiles",
            "master_graph",
            "saved_recommendations",
            "generation_jobs",
            "generation_results",
            "settings",
        ] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        }
        tx.commit().await.map_err(Error::Database)?;
        tracing::info!(subsystem = "db", op = "clear_all", "Cleared all stored data");
        Ok(())
    }
}
