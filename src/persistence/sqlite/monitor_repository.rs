//! Implementation of the MonitorRepository trait for SqliteStateRepository

use std::collections::HashMap;

use async_trait::async_trait;
use url::Url;

use crate::{
    models::{CheckDefinition, MonitorDefinition, MonitorKind, NotifierDefinition, ScheduleWindow},
    persistence::{
        error::PersistenceError, sqlite::SqliteStateRepository, traits::MonitorRepository,
    },
};

const SELECT_MONITORS: &str = "SELECT id, owner_id, name, url, display_url, type, headers, \
     expected_status_code, render_server_urn, require_some, schedule, last_seen_state \
     FROM monitors";

// Helper struct for mapping from the database row
#[derive(sqlx::FromRow)]
struct MonitorRow {
    id: i64,
    owner_id: Option<i64>,
    name: String,
    url: String,
    display_url: String,
    #[sqlx(rename = "type")]
    kind: String,
    headers: String,
    expected_status_code: i64,
    render_server_urn: Option<String>,
    require_some: bool,
    schedule: String,
    last_seen_state: bool,
}

// Helper struct for mapping from the database row
#[derive(sqlx::FromRow)]
struct CheckRow {
    monitor_id: i64,
    name: String,
    #[sqlx(rename = "type")]
    kind: String,
    path: Option<String>,
    value: String,
    expected: bool,
}

fn serialization(field: &str, id: i64, reason: impl std::fmt::Display) -> PersistenceError {
    PersistenceError::SerializationError(format!("monitor {id}: invalid {field}: {reason}"))
}

impl MonitorRow {
    fn into_definition(
        self,
        checks: Vec<CheckDefinition>,
        notifiers: Vec<NotifierDefinition>,
    ) -> Result<MonitorDefinition, PersistenceError> {
        let id = self.id;
        Ok(MonitorDefinition {
            id,
            owner_id: self.owner_id,
            url: Url::parse(&self.url).map_err(|e| serialization("url", id, e))?,
            display_url: Url::parse(&self.display_url)
                .map_err(|e| serialization("display_url", id, e))?,
            kind: self.kind.parse::<MonitorKind>().map_err(|e| serialization("type", id, e))?,
            headers: serde_json::from_str(&self.headers)
                .map_err(|e| serialization("headers", id, e))?,
            expected_status_code: u16::try_from(self.expected_status_code)
                .map_err(|e| serialization("expected_status_code", id, e))?,
            render_server_urn: self.render_server_urn,
            require_some: self.require_some,
            checks,
            notifiers,
            schedule: self
                .schedule
                .parse::<ScheduleWindow>()
                .map_err(|e| serialization("schedule", id, e))?,
            last_seen_state: self.last_seen_state,
            name: self.name,
        })
    }
}

impl From<CheckRow> for CheckDefinition {
    fn from(row: CheckRow) -> Self {
        CheckDefinition {
            name: row.name,
            kind: row.kind,
            path: row.path,
            value: row.value,
            expected: row.expected,
        }
    }
}

impl SqliteStateRepository {
    async fn fetch_check_rows(&self, monitor_id: Option<i64>) -> Result<Vec<CheckRow>, PersistenceError> {
        self.execute_query_with_error_handling(
            "query content checks",
            sqlx::query_as::<_, CheckRow>(
                "SELECT monitor_id, name, type, path, value, expected FROM content_checks \
                 WHERE (?1 IS NULL OR monitor_id = ?1) ORDER BY monitor_id, position",
            )
            .bind(monitor_id)
            .fetch_all(&self.pool),
        )
        .await
    }

    /// Attaches checks and notifiers to monitor rows, keeping row order.
    async fn assemble(
        &self,
        rows: Vec<MonitorRow>,
        monitor_id: Option<i64>,
    ) -> Result<Vec<MonitorDefinition>, PersistenceError> {
        let mut checks: HashMap<i64, Vec<CheckDefinition>> = HashMap::new();
        for row in self.fetch_check_rows(monitor_id).await? {
            checks.entry(row.monitor_id).or_default().push(row.into());
        }

        let mut notifiers: HashMap<i64, Vec<NotifierDefinition>> = HashMap::new();
        for row in self.fetch_notifier_rows(monitor_id).await? {
            let owner = row.monitor_id;
            notifiers.entry(owner).or_default().push(row.into_definition()?);
        }

        rows.into_iter()
            .map(|row| {
                let id = row.id;
                row.into_definition(
                    checks.remove(&id).unwrap_or_default(),
                    notifiers.remove(&id).unwrap_or_default(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl MonitorRepository for SqliteStateRepository {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn definition(&self, id: i64) -> Result<MonitorDefinition, PersistenceError> {
        let row = self
            .execute_query_with_error_handling(
                "query monitor",
                sqlx::query_as::<_, MonitorRow>(&format!("{SELECT_MONITORS} WHERE id = ?"))
                    .bind(id)
                    .fetch_optional(&self.pool),
            )
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("monitor {id}")))?;

        self.assemble(vec![row], Some(id))
            .await?
            .pop()
            .ok_or_else(|| PersistenceError::NotFound(format!("monitor {id}")))
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn definitions(&self) -> Result<Vec<MonitorDefinition>, PersistenceError> {
        let rows = self
            .execute_query_with_error_handling(
                "query monitors",
                sqlx::query_as::<_, MonitorRow>(&format!("{SELECT_MONITORS} ORDER BY id"))
                    .fetch_all(&self.pool),
            )
            .await?;
        tracing::debug!(count = rows.len(), "Loaded monitors.");
        self.assemble(rows, None).await
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn definitions_by_owner(
        &self,
        owner_id: i64,
    ) -> Result<Vec<MonitorDefinition>, PersistenceError> {
        let rows = self
            .execute_query_with_error_handling(
                "query monitors by owner",
                sqlx::query_as::<_, MonitorRow>(&format!(
                    "{SELECT_MONITORS} WHERE owner_id = ? ORDER BY id"
                ))
                .bind(owner_id)
                .fetch_all(&self.pool),
            )
            .await?;
        // Unfiltered child lookups are fine here, owners have few monitors.
        let mut definitions = self.assemble(rows, None).await?;
        definitions.retain(|def| def.owner_id == Some(owner_id));
        Ok(definitions)
    }

    #[tracing::instrument(skip(self, definition), fields(monitor = %definition.name), level = "info")]
    async fn save_definition(&self, definition: &MonitorDefinition) -> Result<i64, PersistenceError> {
        let headers = serde_json::to_string(&definition.headers)
            .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;

        let mut tx = self
            .execute_query_with_error_handling("begin transaction", self.pool.begin())
            .await?;

        let existing = self
            .execute_query_with_error_handling(
                "query monitor by name",
                sqlx::query_scalar::<_, i64>("SELECT id FROM monitors WHERE name = ?")
                    .bind(&definition.name)
                    .fetch_optional(&mut *tx),
            )
            .await?;
        if existing.is_some() {
            return Err(PersistenceError::AlreadyExists(format!("monitor '{}'", definition.name)));
        }

        let id = self
            .execute_query_with_error_handling(
                "insert monitor",
                sqlx::query(
                    "INSERT INTO monitors (owner_id, name, url, display_url, type, headers, \
                     expected_status_code, render_server_urn, require_some, schedule, last_seen_state) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(definition.owner_id)
                .bind(&definition.name)
                .bind(definition.url.as_str())
                .bind(definition.display_url.as_str())
                .bind(definition.kind.as_str())
                .bind(&headers)
                .bind(i64::from(definition.expected_status_code))
                .bind(&definition.render_server_urn)
                .bind(definition.require_some)
                .bind(definition.schedule.to_string())
                .bind(definition.last_seen_state)
                .execute(&mut *tx),
            )
            .await?
            .last_insert_rowid();

        for (position, check) in definition.checks.iter().enumerate() {
            self.execute_query_with_error_handling(
                "insert content check",
                sqlx::query(
                    "INSERT INTO content_checks (monitor_id, position, name, type, path, value, expected) \
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(id)
                .bind(position as i64)
                .bind(&check.name)
                .bind(&check.kind)
                .bind(&check.path)
                .bind(&check.value)
                .bind(check.expected)
                .execute(&mut *tx),
            )
            .await?;
        }

        for (position, notifier) in definition.notifiers.iter().enumerate() {
            let options = serde_json::to_string(&notifier.options)
                .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
            self.execute_query_with_error_handling(
                "insert notifier",
                sqlx::query("INSERT OR IGNORE INTO notifiers (name, type, options) VALUES (?, ?, ?)")
                    .bind(&notifier.name)
                    .bind(&notifier.kind)
                    .bind(&options)
                    .execute(&mut *tx),
            )
            .await?;
            let notifier_id = self
                .execute_query_with_error_handling(
                    "query notifier",
                    sqlx::query_scalar::<_, i64>(
                        "SELECT id FROM notifiers WHERE name = ? AND type = ? AND options = ?",
                    )
                    .bind(&notifier.name)
                    .bind(&notifier.kind)
                    .bind(&options)
                    .fetch_one(&mut *tx),
                )
                .await?;
            self.execute_query_with_error_handling(
                "link notifier",
                sqlx::query(
                    "INSERT OR IGNORE INTO monitor_notifiers (monitor_id, notifier_id, position) \
                     VALUES (?, ?, ?)",
                )
                .bind(id)
                .bind(notifier_id)
                .bind(position as i64)
                .execute(&mut *tx),
            )
            .await?;
        }

        self.execute_query_with_error_handling("commit transaction", tx.commit()).await?;
        tracing::info!(monitor_id = id, "Monitor saved.");
        Ok(id)
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn set_last_seen_state(&self, id: i64, state: bool) -> Result<(), PersistenceError> {
        let result = self
            .execute_query_with_error_handling(
                "update last seen state",
                sqlx::query(
                    "UPDATE monitors SET last_seen_state = ?, updated_at = CURRENT_TIMESTAMP \
                     WHERE id = ?",
                )
                .bind(state)
                .bind(id)
                .execute(&self.pool),
            )
            .await?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(format!("monitor {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, time::Duration};

    use super::*;
    use crate::{
        persistence::sqlite::tests::setup_test_db,
        test_helpers::{MonitorDefinitionBuilder, create_test_factory},
    };

    fn shop(name: &str, owner: Option<i64>) -> MonitorDefinition {
        let mut def = MonitorDefinitionBuilder::new(name)
            .url("https://shop.example.com/p/1")
            .header("Accept", "text/html")
            .interval(Duration::from_secs(300))
            .check(CheckDefinition {
                name: "price".into(),
                kind: "html_xpath".into(),
                path: Some("//span[@id='price']/text()".into()),
                value: "9.99".into(),
                expected: true,
            })
            .check(CheckDefinition {
                name: "sold-out".into(),
                kind: "regex".into(),
                path: None,
                value: "Sold out".into(),
                expected: false,
            })
            .notifier(NotifierDefinition {
                name: "team".into(),
                kind: "slack".into(),
                options: BTreeMap::from([("webhook".into(), "https://hooks.slack.com/x".into())]),
            })
            .build();
        def.owner_id = owner;
        def
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let repo = setup_test_db().await;
        let def = shop("Shop", Some(7));

        let id = repo.save_definition(&def).await.unwrap();
        let loaded = repo.definition(id).await.unwrap();

        assert_eq!(loaded, MonitorDefinition { id, ..def });
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let repo = setup_test_db().await;
        repo.save_definition(&shop("Shop", None)).await.unwrap();

        assert!(matches!(
            repo.save_definition(&shop("Shop", None)).await,
            Err(PersistenceError::AlreadyExists(_))
        ));
        assert_eq!(repo.definitions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shared_notifier_rows() {
        let repo = setup_test_db().await;
        let a = repo.save_definition(&shop("A", Some(1))).await.unwrap();
        let b = repo.save_definition(&shop("B", Some(2))).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifiers")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let all = repo.definitions().await.unwrap();
        assert_eq!(all.iter().map(|d| d.id).collect::<Vec<_>>(), vec![a, b]);
        assert!(all.iter().all(|d| d.notifiers.len() == 1 && d.checks.len() == 2));

        let owned = repo.definitions_by_owner(2).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].name, "B");
    }

    #[tokio::test]
    async fn test_hydrated_lookups() {
        let repo = setup_test_db().await;
        let factory = create_test_factory();
        let a = repo.save_definition(&shop("A", Some(1))).await.unwrap();
        repo.save_definition(&shop("B", Some(2))).await.unwrap();

        let monitor = repo.find(a, &factory).await.unwrap();
        assert_eq!(monitor.name(), "A");
        assert_eq!(monitor.checkers().len(), 2);
        assert_eq!(monitor.notifiers().len(), 1);

        assert_eq!(repo.all(&factory).await.unwrap().len(), 2);
        let owned = repo.find_by_owner(2, &factory).await.unwrap();
        assert_eq!(owned.iter().map(|m| m.name()).collect::<Vec<_>>(), vec!["B"]);
        assert!(matches!(repo.find(a + 100, &factory).await, Err(PersistenceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unbuildable_monitor_is_invalid_input() {
        let repo = setup_test_db().await;
        let id = repo.save_definition(&shop("A", None)).await.unwrap();
        sqlx::query("UPDATE content_checks SET type = 'css'")
            .execute(&repo.pool)
            .await
            .unwrap();

        assert!(matches!(
            repo.find(id, &create_test_factory()).await,
            Err(PersistenceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_last_seen_state() {
        let repo = setup_test_db().await;
        let id = repo.save_definition(&shop("Shop", None)).await.unwrap();

        repo.set_last_seen_state(id, true).await.unwrap();
        assert!(repo.definition(id).await.unwrap().last_seen_state);

        assert!(matches!(
            repo.set_last_seen_state(id + 100, true).await,
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_rows() {
        let repo = setup_test_db().await;
        assert!(matches!(repo.definition(42).await, Err(PersistenceError::NotFound(_))));

        let id = repo.save_definition(&shop("Shop", None)).await.unwrap();
        sqlx::query("UPDATE monitors SET schedule = 'every tuesday' WHERE id = ?")
            .bind(id)
            .execute(&repo.pool)
            .await
            .unwrap();

        assert!(matches!(
            repo.definition(id).await,
            Err(PersistenceError::SerializationError(_))
        ));
    }
}
