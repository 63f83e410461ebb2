//! Implementation of the CheckLogStore trait for SqliteStateRepository

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    models::CheckLogEntry,
    persistence::{error::PersistenceError, sqlite::SqliteStateRepository, traits::CheckLogStore},
};

#[derive(sqlx::FromRow)]
struct CheckLogRow {
    name: String,
    display_url: String,
    matches_checks: bool,
    created_at: DateTime<Utc>,
}

impl From<CheckLogRow> for CheckLogEntry {
    fn from(row: CheckLogRow) -> Self {
        CheckLogEntry {
            name: row.name,
            display_url: row.display_url,
            matches_checks: row.matches_checks,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CheckLogStore for SqliteStateRepository {
    #[tracing::instrument(skip(self, entry), fields(monitor = %entry.name), level = "debug")]
    async fn append(&self, entry: &CheckLogEntry) -> Result<(), PersistenceError> {
        self.execute_query_with_error_handling(
            "insert check log",
            sqlx::query(
                "INSERT INTO check_logs (name, display_url, matches_checks, created_at) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&entry.name)
            .bind(&entry.display_url)
            .bind(entry.matches_checks)
            .bind(entry.created_at)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn recent(&self, limit: u32) -> Result<Vec<CheckLogEntry>, PersistenceError> {
        let rows = self
            .execute_query_with_error_handling(
                "query check logs",
                sqlx::query_as::<_, CheckLogRow>(
                    "SELECT name, display_url, matches_checks, created_at FROM check_logs \
                     ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(i64::from(limit))
                .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows.into_iter().map(CheckLogEntry::from).collect())
    }
}
