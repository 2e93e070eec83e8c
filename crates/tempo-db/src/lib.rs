//! PostgreSQL storage layer for Tempo.
//!
//! Also provides in-memory implementations of the same ports for tests and
//! local runs without a database.

pub mod memory;
pub mod pagination;
pub mod repositories;

pub use memory::{MemoryCheckinStore, MemoryClientRepository, MemoryInsightStore, MemoryPlanStore};
pub use repositories::*;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tempo_core::config::DatabaseSettings;
use tempo_core::{Error, Result};
use tracing::info;

const SCHEMA: &str = include_str!("schema.sql");

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to the database.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .connect(&settings.url)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create any missing tables and indexes. Safe to run on every start.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        info!("Database schema ready");
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
