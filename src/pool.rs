//! Connection pool wrapper.
//!
//! Database-specific pools (`PgPool`, `MySqlPool`, `SqlitePool`) wrapped in a
//! single enum. Avoids `AnyPool` so each backend keeps its full type support.

use crate::config::{ConnectionConfig, DatabaseKind};
use crate::error::{AdapterError, AdapterResult};
use sqlx::{
    MySqlPool, PgPool, SqlitePool, mysql::MySqlPoolOptions, postgres::PgPoolOptions,
    sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Database-specific connection pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    /// Connect to the database described by `config`.
    pub async fn connect(config: &ConnectionConfig) -> AdapterResult<Self> {
        info!(
            kind = %config.kind,
            url = %config.masked_connection_string(),
            "Connecting to database"
        );

        let acquire_timeout = Duration::from_secs(config.pool.acquire_timeout_secs);
        let pool = match config.kind {
            DatabaseKind::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.pool.max_connections)
                    .min_connections(config.pool.min_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect(&config.connection_string)
                    .await
                    .map_err(AdapterError::from)?;
                Self::Postgres(pool)
            }
            DatabaseKind::MySql => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(config.pool.max_connections)
                    .min_connections(config.pool.min_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect(&config.connection_string)
                    .await
                    .map_err(AdapterError::from)?;
                Self::MySql(pool)
            }
            DatabaseKind::Sqlite => {
                let options = SqliteConnectOptions::from_str(&config.connection_string)
                    .map_err(AdapterError::from)?
                    .create_if_missing(true);
                let pool = SqlitePoolOptions::new()
                    .max_connections(config.pool.max_connections)
                    .min_connections(config.pool.min_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect_with(options)
                    .await
                    .map_err(AdapterError::from)?;
                Self::Sqlite(pool)
            }
        };

        Ok(pool)
    }

    /// Get the backend kind for this pool.
    pub fn kind(&self) -> DatabaseKind {
        match self {
            Self::Postgres(_) => DatabaseKind::Postgres,
            Self::MySql(_) => DatabaseKind::MySql,
            Self::Sqlite(_) => DatabaseKind::Sqlite,
        }
    }

    /// Close the pool and all its connections.
    pub async fn close(&self) {
        match self {
            Self::Postgres(pool) => pool.close().await,
            Self::MySql(pool) => pool.close().await,
            Self::Sqlite(pool) => pool.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_memory_connect() {
        let config = ConnectionConfig::new("sqlite::memory:").unwrap();
        let pool = DbPool::connect(&config).await.unwrap();
        assert_eq!(pool.kind(), DatabaseKind::Sqlite);
        pool.close().await;
    }
}
