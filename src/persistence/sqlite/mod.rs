//! SQLite implementation of the repositories.

use std::str::FromStr;

use sqlx::{SqlitePool, sqlite::SqliteConnectOptions};

mod check_log;
mod monitor_repository;
mod notifier_repository;

use crate::persistence::error::PersistenceError;

/// Monitor, notifier and check log storage backed by one SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStateRepository {
    pool: SqlitePool,
}

impl SqliteStateRepository {
    /// Connects to `database_url`, creating the database file if it does not
    /// exist.
    #[tracing::instrument(level = "info")]
    pub async fn new(database_url: &str) -> Result<Self, PersistenceError> {
        tracing::debug!(database_url, "Attempting to connect to SQLite database.");
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| PersistenceError::InvalidInput(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            PersistenceError::OperationFailed(format!("Failed to connect to database: {e}"))
        })?;
        tracing::info!(database_url, "Successfully connected to SQLite database.");
        Ok(Self { pool })
    }

    /// Applies the embedded migrations.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn run_migrations(&self) -> Result<(), PersistenceError> {
        tracing::debug!("Running database migrations.");
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run database migrations.");
            PersistenceError::MigrationError(e.to_string())
        })?;
        tracing::info!("Database migrations completed successfully.");
        Ok(())
    }

    /// Closes the connection pool.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("SQLite connection pool closed.");
    }

    /// Awaits a query and maps its error, logging the failed operation.
    async fn execute_query_with_error_handling<F, T>(
        &self,
        operation: &str,
        query: F,
    ) -> Result<T, PersistenceError>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        query.await.map_err(|e| {
            tracing::error!(error = %e, operation = %operation, "Database operation failed.");
            PersistenceError::OperationFailed(e.to_string())
        })
    }
}
