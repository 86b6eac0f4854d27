use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};


pub mod models;
pub mod queries;

pub use models::{ChunkRecord, IndexIdentity, IndexRecord, NewChunk};
pub use queries::{ChunkFilter, ChunkQueries, IndexQueries};

pub type DbPool = Pool<Sqlite>;

/// Connection pool over the metadata database.
///
/// Index identities and chunk rows live here; the vectors themselves live in
/// per-index binary files next to the database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.init_schema().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        debug!("Ensuring metadata schema");

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS indexes (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 document_id TEXT NOT NULL,
                 provider_name TEXT NOT NULL,
                 model_id TEXT NOT NULL,
                 dimensions INTEGER NOT NULL,
                 chunk_size INTEGER NOT NULL,
                 chunk_overlap INTEGER NOT NULL,
                 total_chunks INTEGER NOT NULL DEFAULT 0,
                 metadata TEXT,
                 created_date DATETIME NOT NULL,
                 updated_date DATETIME NOT NULL,
                 UNIQUE(document_id, provider_name, model_id, dimensions, chunk_size, chunk_overlap)
             )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create indexes table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 index_id INTEGER NOT NULL REFERENCES indexes(id) ON DELETE CASCADE,
                 ordinal INTEGER NOT NULL,
                 start_offset INTEGER NOT NULL,
                 end_offset INTEGER NOT NULL,
                 content TEXT NOT NULL,
                 has_argument_marker INTEGER NOT NULL DEFAULT 0,
                 indexed_date DATETIME NOT NULL,
                 UNIQUE(index_id, ordinal)
             )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create chunks table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_index_id ON chunks(index_id)")
            .execute(&self.pool)
            .await
            .context("Failed to create chunks index")?;

        debug!("Metadata schema ready");
        Ok(())
    }

    /// Reclaim space and refresh query planner statistics.
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing metadata database");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        Ok(())
    }
}
