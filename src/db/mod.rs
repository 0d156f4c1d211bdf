//! Postgres connection pool, migrations, and health check.
//!
//! Backs the durable dispatch ledger; see [`crate::ledger::PgLedger`].

pub mod processed;

pub use processed::ProcessedRecord;

use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Database handle. Owns the connection pool.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::error::Error::Ledger(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check, a `SELECT 1`.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
