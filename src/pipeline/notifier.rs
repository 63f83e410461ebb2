//! The notifier role: turns published results into notifications.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::PipelineError;
use crate::{
    metrics::{MONITOR_STATE, MetricsSink, NOTIFICATIONS_FAILED_TOTAL},
    models::CrawlResult,
    notifiers::{NotifierRegistry, fan_out},
    persistence::{MonitorRepository, NotifierRepository},
    queue::{Channel, Delivery, MessageBroker},
};

/// What became of one result message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The state did not change, nobody was notified.
    Unchanged,
    /// The state changed and the notifiers were invoked.
    Notified {
        /// Notifiers invoked.
        notifiers: usize,
        /// Notifiers that returned an error.
        failed: usize,
    },
    /// The message was unusable and is dropped.
    Rejected(String),
}

/// Consumes [`Channel::Notifications`] and notifies on state transitions.
///
/// The last notified state of each monitor lives in the store, so any
/// number of dispatchers agree on what counts as a change.
pub struct NotificationDispatcher {
    monitors: Arc<dyn MonitorRepository>,
    notifiers: Arc<dyn NotifierRepository>,
    registry: NotifierRegistry,
    broker: Arc<dyn MessageBroker>,
    metrics: Arc<dyn MetricsSink>,
    consumer_tag: String,
}

impl NotificationDispatcher {
    /// Creates a dispatcher building notifiers through `registry`.
    pub fn new(
        monitors: Arc<dyn MonitorRepository>,
        notifiers: Arc<dyn NotifierRepository>,
        registry: NotifierRegistry,
        broker: Arc<dyn MessageBroker>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            monitors,
            notifiers,
            registry,
            broker,
            metrics,
            consumer_tag: "sitewatch-notifier".to_string(),
        }
    }

    /// Handles one result payload. Fails only when the store cannot record
    /// the new state.
    #[tracing::instrument(skip_all, level = "debug")]
    pub async fn process(&self, payload: &[u8]) -> Result<DispatchOutcome, PipelineError> {
        let result: CrawlResult = match serde_json::from_slice(payload) {
            Ok(result) => result,
            Err(e) => return Ok(DispatchOutcome::Rejected(format!("malformed result: {e}"))),
        };
        let definition = match self.monitors.definition(result.monitor_id).await {
            Ok(definition) => definition,
            Err(e) => {
                return Ok(DispatchOutcome::Rejected(format!("monitor {}: {e}", result.monitor_id)));
            }
        };

        self.metrics.set_gauge(
            MONITOR_STATE,
            Some(&definition.name),
            if result.result { 1.0 } else { 0.0 },
        );
        if definition.last_seen_state == result.result {
            return Ok(DispatchOutcome::Unchanged);
        }

        self.monitors.set_last_seen_state(definition.id, result.result).await?;
        tracing::info!(monitor = %definition.name, matched = result.result, "Monitor state changed.");

        let notifier_definitions = self.notifiers.notifier_definitions(definition.id).await?;
        let notifiers = match self.registry.build_all(&notifier_definitions) {
            Ok(notifiers) => notifiers,
            Err(e) => {
                return Ok(DispatchOutcome::Rejected(format!(
                    "notifiers of monitor {}: {e}",
                    definition.id
                )));
            }
        };

        let results = result.to_result_set(definition.aggregation());
        let failed = fan_out(&notifiers, &definition.name, definition.display_url.as_str(), &results).await;
        for _ in 0..failed {
            self.metrics.increment_counter(NOTIFICATIONS_FAILED_TOTAL, Some(&definition.name));
        }
        Ok(DispatchOutcome::Notified { notifiers: notifiers.len(), failed })
    }

    async fn handle(&self, delivery: Delivery) {
        let settled = match self.process(delivery.payload()).await {
            Ok(DispatchOutcome::Rejected(reason)) => {
                tracing::warn!(reason, "Rejecting result.");
                delivery.reject().await
            }
            Ok(_) => delivery.ack().await,
            Err(e) => {
                tracing::error!(error = %e, "Failed to record state, dropping result.");
                delivery.reject().await
            }
        };
        if let Err(e) = settled {
            tracing::error!(error = %e, "Failed to settle delivery.");
        }
    }

    /// Consumes results one at a time until `cancellation_token` fires or
    /// the subscription ends.
    pub async fn run(self, cancellation_token: CancellationToken) -> Result<(), PipelineError> {
        let mut deliveries =
            self.broker.subscribe(Channel::Notifications, &self.consumer_tag).await?;
        tracing::info!("Notification dispatcher started.");

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => self.handle(delivery).await,
                    Some(Err(e)) => tracing::error!(error = %e, "Failed to receive result."),
                    None => break,
                },
            }
        }

        tracing::info!("Notification dispatcher stopped.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, time::Duration};

    use mockall::predicate::eq;

    use super::*;
    use crate::{
        metrics::InMemoryMetrics,
        models::{NotifierDefinition, ResultEntry},
        notifiers::NotifierDeps,
        persistence::{MockMonitorRepository, MockNotifierRepository, PersistenceError},
        queue::InMemoryBroker,
        test_helpers::{MonitorDefinitionBuilder, create_test_http_client},
    };

    fn payload(matched: bool) -> Vec<u8> {
        serde_json::to_vec(&CrawlResult {
            monitor_id: 3,
            name: "Shop".into(),
            kind: "monitor".into(),
            results: vec![ResultEntry {
                kind: "RegexChecker".into(),
                message: "stock - 'In stock' found".into(),
                result: matched,
                err: None,
            }],
            result: matched,
        })
        .unwrap()
    }

    fn monitors(last_seen_state: bool, expect_update: bool) -> MockMonitorRepository {
        let mut repo = MockMonitorRepository::new();
        repo.expect_definition().returning(move |id| match id {
            3 => {
                let mut def = MonitorDefinitionBuilder::new("Shop").id(3).build();
                def.last_seen_state = last_seen_state;
                Ok(def)
            }
            _ => Err(PersistenceError::NotFound(format!("monitor {id}"))),
        });
        repo.expect_set_last_seen_state()
            .with(eq(3), eq(!last_seen_state))
            .times(usize::from(expect_update))
            .returning(|_, _| Ok(()));
        repo
    }

    fn dispatcher(
        monitors: MockMonitorRepository,
        webhook: &str,
    ) -> (NotificationDispatcher, Arc<InMemoryMetrics>) {
        let webhook = webhook.to_string();
        let mut notifiers = MockNotifierRepository::new();
        notifiers.expect_notifier_definitions().returning(move |_| {
            Ok(vec![NotifierDefinition {
                name: "team".into(),
                kind: "webhook".into(),
                options: BTreeMap::from([("url".to_string(), webhook.clone())]),
            }])
        });
        let metrics = Arc::new(InMemoryMetrics::new());
        let dispatcher = NotificationDispatcher::new(
            Arc::new(monitors),
            Arc::new(notifiers),
            NotifierRegistry::new(NotifierDeps::new(
                create_test_http_client(),
                Duration::from_secs(1),
            )),
            Arc::new(InMemoryBroker::new()),
            metrics.clone(),
        );
        (dispatcher, metrics)
    }

    #[tokio::test]
    async fn test_transition_notifies_and_persists() {
        let mut server = mockito::Server::new_async().await;
        let hook = server.mock("POST", "/hook").with_status(200).expect(1).create_async().await;
        let (dispatcher, metrics) = dispatcher(monitors(false, true), &format!("{}/hook", server.url()));

        let outcome = dispatcher.process(&payload(true)).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Notified { notifiers: 1, failed: 0 });
        assert_eq!(metrics.value(MONITOR_STATE, Some("Shop")), Some(1.0));
        hook.assert_async().await;
    }

    #[tokio::test]
    async fn test_same_state_is_silent() {
        let mut server = mockito::Server::new_async().await;
        let hook = server.mock("POST", "/hook").expect(0).create_async().await;
        let (dispatcher, _) = dispatcher(monitors(true, false), &format!("{}/hook", server.url()));

        assert_eq!(dispatcher.process(&payload(true)).await.unwrap(), DispatchOutcome::Unchanged);
        hook.assert_async().await;
    }

    #[tokio::test]
    async fn test_failing_notifier_is_counted() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/hook").with_status(500).create_async().await;
        let (dispatcher, metrics) = dispatcher(monitors(true, true), &format!("{}/hook", server.url()));

        let outcome = dispatcher.process(&payload(false)).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Notified { notifiers: 1, failed: 1 });
        assert_eq!(metrics.value(NOTIFICATIONS_FAILED_TOTAL, Some("Shop")), Some(1.0));
    }

    #[tokio::test]
    async fn test_unusable_results_are_rejected() {
        let (dispatcher, _) = dispatcher(monitors(false, false), "http://127.0.0.1:1/hook");

        assert!(matches!(
            dispatcher.process(b"{").await.unwrap(),
            DispatchOutcome::Rejected(_)
        ));
        let mut unknown: CrawlResult = serde_json::from_slice(&payload(true)).unwrap();
        unknown.monitor_id = 8;
        assert!(matches!(
            dispatcher.process(&serde_json::to_vec(&unknown).unwrap()).await.unwrap(),
            DispatchOutcome::Rejected(_)
        ));
    }
}
