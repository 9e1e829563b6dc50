use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::error::Result;

/// Embedded schema migrations, applied on startup and available to callers
/// that manage their own pool.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Shared handle over the Postgres connection pool.
///
/// Every engine run and every webhook transaction checks one connection out
/// of this pool and returns it on completion.
#[derive(Clone, Debug)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        info!(max_connections, "connected to postgres");

        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests, callers that manage their own).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn initialize_schema(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
