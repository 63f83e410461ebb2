//! Implementation of the NotifierRepository trait for SqliteStateRepository

use async_trait::async_trait;

use crate::{
    models::NotifierDefinition,
    persistence::{
        error::PersistenceError, sqlite::SqliteStateRepository, traits::NotifierRepository,
    },
};

/// A notifier joined with the monitor it is attached to.
#[derive(sqlx::FromRow)]
pub(super) struct NotifierRow {
    pub(super) monitor_id: i64,
    name: String,
    #[sqlx(rename = "type")]
    kind: String,
    options: String,
}

impl NotifierRow {
    pub(super) fn into_definition(self) -> Result<NotifierDefinition, PersistenceError> {
        let options = serde_json::from_str(&self.options).map_err(|e| {
            PersistenceError::SerializationError(format!(
                "notifier '{}': invalid options: {e}",
                self.name
            ))
        })?;
        Ok(NotifierDefinition { name: self.name, kind: self.kind, options })
    }
}

impl SqliteStateRepository {
    /// Notifier rows of one monitor, or of every monitor when `monitor_id` is
    /// `None`, in attachment order.
    pub(super) async fn fetch_notifier_rows(
        &self,
        monitor_id: Option<i64>,
    ) -> Result<Vec<NotifierRow>, PersistenceError> {
        self.execute_query_with_error_handling(
            "query notifiers",
            sqlx::query_as::<_, NotifierRow>(
                "SELECT mn.monitor_id, n.name, n.type, n.options \
                 FROM monitor_notifiers mn JOIN notifiers n ON n.id = mn.notifier_id \
                 WHERE (?1 IS NULL OR mn.monitor_id = ?1) \
                 ORDER BY mn.monitor_id, mn.position",
            )
            .bind(monitor_id)
            .fetch_all(&self.pool),
        )
        .await
    }
}

#[async_trait]
impl NotifierRepository for SqliteStateRepository {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn notifier_definitions(
        &self,
        monitor_id: i64,
    ) -> Result<Vec<NotifierDefinition>, PersistenceError> {
        self.fetch_notifier_rows(Some(monitor_id))
            .await?
            .into_iter()
            .map(NotifierRow::into_definition)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, time::Duration};

    use super::*;
    use crate::{
        notifiers::{NotifierDeps, NotifierRegistry},
        persistence::{sqlite::tests::setup_test_db, traits::MonitorRepository},
        test_helpers::{MonitorDefinitionBuilder, create_test_http_client},
    };

    fn slack(name: &str) -> NotifierDefinition {
        NotifierDefinition {
            name: name.into(),
            kind: "slack".into(),
            options: BTreeMap::from([("webhook".into(), format!("https://hooks.slack.com/{name}"))]),
        }
    }

    #[tokio::test]
    async fn test_notifiers_in_attachment_order() {
        let repo = setup_test_db().await;
        let id = repo
            .save_definition(
                &MonitorDefinitionBuilder::new("Shop")
                    .notifier(slack("second"))
                    .notifier(slack("first"))
                    .build(),
            )
            .await
            .unwrap();

        let defs = repo.notifier_definitions(id).await.unwrap();
        assert_eq!(defs, vec![slack("second"), slack("first")]);

        let registry = NotifierRegistry::new(NotifierDeps::new(
            create_test_http_client(),
            Duration::from_secs(1),
        ));
        let live = repo.find_by_monitor_id(id, &registry).await.unwrap();
        assert_eq!(live.iter().map(|n| n.name()).collect::<Vec<_>>(), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_unknown_monitor_has_no_notifiers() {
        let repo = setup_test_db().await;
        assert!(repo.notifier_definitions(99).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_options() {
        let repo = setup_test_db().await;
        let id = repo
            .save_definition(&MonitorDefinitionBuilder::new("Shop").notifier(slack("a")).build())
            .await
            .unwrap();
        sqlx::query("UPDATE notifiers SET options = 'not json'")
            .execute(&repo.pool)
            .await
            .unwrap();

        assert!(matches!(
            repo.notifier_definitions(id).await,
            Err(PersistenceError::SerializationError(_))
        ));
    }
}
