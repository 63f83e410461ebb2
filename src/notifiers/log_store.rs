use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::{Notifier, NotifierError};
use crate::{
    models::{CheckLogEntry, ResultSet},
    persistence::CheckLogStore,
};

/// Records every alert in the check log.
#[derive(Debug)]
pub struct LogStoreNotifier {
    name: String,
    store: Arc<dyn CheckLogStore>,
}

impl LogStoreNotifier {
    /// Creates a notifier appending to `store`.
    pub fn new(name: impl Into<String>, store: Arc<dyn CheckLogStore>) -> Self {
        Self { name: name.into(), store }
    }
}

#[async_trait]
impl Notifier for LogStoreNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "log"
    }

    async fn notify(
        &self,
        name: &str,
        display_url: &str,
        results: &ResultSet,
    ) -> Result<(), NotifierError> {
        let entry = CheckLogEntry {
            name: name.to_string(),
            display_url: display_url.to_string(),
            matches_checks: results.matched(),
            created_at: Utc::now(),
        };
        self.store.append(&entry).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Aggregation, CheckResult},
        persistence::{MockCheckLogStore, PersistenceError},
    };

    #[tokio::test]
    async fn test_appends_aggregate_state() {
        let mut store = MockCheckLogStore::new();
        store
            .expect_append()
            .withf(|entry| {
                entry.name == "Shop" && entry.display_url == "https://shop/p" && entry.matches_checks
            })
            .times(1)
            .returning(|_| Ok(()));

        let notifier = LogStoreNotifier::new("audit", Arc::new(store));
        let results = ResultSet::from_results(
            Aggregation::AnyMayPass,
            vec![
                CheckResult::new("RegexChecker", "a", false, None),
                CheckResult::new("RegexChecker", "b", true, None),
            ],
        );

        notifier.notify("Shop", "https://shop/p", &results).await.unwrap();
    }

    #[tokio::test]
    async fn test_store_failure_is_reported() {
        let mut store = MockCheckLogStore::new();
        store
            .expect_append()
            .returning(|_| Err(PersistenceError::OperationFailed("disk full".into())));

        let notifier = LogStoreNotifier::new("audit", Arc::new(store));
        let err = notifier
            .notify("Shop", "https://shop/p", &ResultSet::default())
            .await
            .unwrap_err();

        assert!(matches!(err, NotifierError::Store(_)));
    }
}
