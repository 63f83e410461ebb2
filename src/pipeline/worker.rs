//! The worker role: runs queued jobs and publishes their results.

use std::sync::Arc;

use futures::StreamExt;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;

use super::PipelineError;
use crate::{
    fetch::FetcherSet,
    metrics::{MONITORS_ERRORED_TOTAL, MONITORS_PROCESSED_TOTAL, MetricsSink},
    models::{CrawlResult, ScheduleJob},
    monitor::MonitorFactory,
    persistence::MonitorRepository,
    queue::{Channel, Delivery, MessageBroker},
};

/// What became of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The checks ran and their result was published.
    Published(CrawlResult),
    /// The target could not be fetched. Nothing was published.
    FetchFailed,
    /// The job was unusable and is dropped.
    Rejected(String),
}

/// Consumes [`Channel::Schedule`] and publishes one [`CrawlResult`] per
/// checked monitor to [`Channel::Notifications`].
pub struct Worker {
    repository: Arc<dyn MonitorRepository>,
    factory: MonitorFactory,
    fetchers: FetcherSet,
    broker: Arc<dyn MessageBroker>,
    metrics: Arc<dyn MetricsSink>,
    concurrency: usize,
    consumer_tag: String,
}

impl Worker {
    /// Creates a worker that runs at most `concurrency` jobs at once.
    pub fn new(
        repository: Arc<dyn MonitorRepository>,
        factory: MonitorFactory,
        fetchers: FetcherSet,
        broker: Arc<dyn MessageBroker>,
        metrics: Arc<dyn MetricsSink>,
        concurrency: usize,
    ) -> Self {
        Self {
            repository,
            factory,
            fetchers,
            broker,
            metrics,
            concurrency: concurrency.max(1),
            consumer_tag: "sitewatch-worker".to_string(),
        }
    }

    /// Overrides the consumer tag announced to the broker.
    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }

    /// Runs one job payload. Only publishing the result can fail.
    #[tracing::instrument(skip_all, level = "debug")]
    pub async fn process(&self, payload: &[u8]) -> Result<JobOutcome, PipelineError> {
        let job: ScheduleJob = match serde_json::from_slice(payload) {
            Ok(job) => job,
            Err(e) => return Ok(JobOutcome::Rejected(format!("malformed job: {e}"))),
        };
        if job.kind != ScheduleJob::MONITOR {
            return Ok(JobOutcome::Rejected(format!("unknown job type '{}'", job.kind)));
        }

        let definition = match self.repository.definition(job.monitor_id).await {
            Ok(definition) => definition,
            Err(e) => {
                return Ok(JobOutcome::Rejected(format!("monitor {}: {e}", job.monitor_id)));
            }
        };
        let monitor = match self.factory.build(definition) {
            Ok(monitor) => monitor,
            Err(e) => {
                return Ok(JobOutcome::Rejected(format!("monitor {}: {e}", job.monitor_id)));
            }
        };

        let results = match monitor.execute(&self.fetchers).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(monitor_id = job.monitor_id, error = %e, "Check failed.");
                self.metrics.increment_counter(MONITORS_ERRORED_TOTAL, Some(monitor.name()));
                return Ok(JobOutcome::FetchFailed);
            }
        };
        self.metrics.increment_counter(MONITORS_PROCESSED_TOTAL, Some(monitor.name()));

        let result = CrawlResult::from_results(&job, &results);
        self.broker.publish(Channel::Notifications, &serde_json::to_vec(&result)?).await?;
        tracing::info!(monitor_id = result.monitor_id, matched = result.result, "Result published.");
        Ok(JobOutcome::Published(result))
    }

    /// Processes and settles one delivery.
    pub async fn handle(&self, delivery: Delivery) {
        let settled = match self.process(delivery.payload()).await {
            Ok(JobOutcome::Rejected(reason)) => {
                tracing::warn!(reason, "Rejecting job.");
                delivery.reject().await
            }
            Ok(_) => delivery.ack().await,
            Err(e) => {
                tracing::error!(error = %e, "Failed to publish result, dropping job.");
                delivery.reject().await
            }
        };
        if let Err(e) = settled {
            tracing::error!(error = %e, "Failed to settle delivery.");
        }
    }

    /// Consumes jobs until `cancellation_token` fires or the subscription
    /// ends, then waits for the jobs in flight.
    pub async fn run(self: Arc<Self>, cancellation_token: CancellationToken) -> Result<(), PipelineError> {
        let mut deliveries = self.broker.subscribe(Channel::Schedule, &self.consumer_tag).await?;
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight = JoinSet::new();
        tracing::info!(concurrency = self.concurrency, "Worker started.");

        loop {
            let permit = tokio::select! {
                _ = cancellation_token.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let delivery = tokio::select! {
                _ = cancellation_token.cancelled() => break,
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => delivery,
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Failed to receive job.");
                        continue;
                    }
                    None => break,
                },
            };

            let worker = Arc::clone(&self);
            in_flight.spawn(async move {
                worker.handle(delivery).await;
                drop(permit);
            });
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Job task panicked.");
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Job task panicked.");
            }
        }
        tracing::info!("Worker stopped.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        fetch::FetchError,
        metrics::InMemoryMetrics,
        models::CheckDefinition,
        persistence::{MockMonitorRepository, PersistenceError},
        queue::InMemoryBroker,
        test_helpers::{MonitorDefinitionBuilder, StaticFetcher, create_test_factory},
    };

    fn repository() -> Arc<dyn MonitorRepository> {
        let mut repo = MockMonitorRepository::new();
        repo.expect_definition().returning(|id| match id {
            5 => Ok(MonitorDefinitionBuilder::new("Shop")
                .id(5)
                .check(CheckDefinition {
                    name: "stock".into(),
                    kind: "regex".into(),
                    path: None,
                    value: "In stock".into(),
                    expected: true,
                })
                .build()),
            _ => Err(PersistenceError::NotFound(format!("monitor {id}"))),
        });
        Arc::new(repo)
    }

    fn worker(fetcher: StaticFetcher, broker: Arc<InMemoryBroker>) -> (Worker, Arc<InMemoryMetrics>) {
        let metrics = Arc::new(InMemoryMetrics::new());
        let worker = Worker::new(
            repository(),
            create_test_factory(),
            FetcherSet::uniform(Arc::new(fetcher)),
            broker,
            metrics.clone(),
            2,
        );
        (worker, metrics)
    }

    #[tokio::test]
    async fn test_process_publishes_result() {
        let broker = Arc::new(InMemoryBroker::new());
        let (worker, metrics) = worker(StaticFetcher::body("<p>In stock</p>"), broker.clone());

        let outcome = worker.process(br#"{"monitor_id":5,"name":"Shop","type":"monitor"}"#).await;

        let Ok(JobOutcome::Published(result)) = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert_eq!(result.monitor_id, 5);
        assert!(result.result);
        assert_eq!(result.results.len(), 1);
        assert_eq!(broker.depth(Channel::Notifications), 1);
        assert_eq!(metrics.value(MONITORS_PROCESSED_TOTAL, Some("Shop")), Some(1.0));
    }

    #[tokio::test]
    async fn test_unusable_jobs_are_rejected() {
        let broker = Arc::new(InMemoryBroker::new());
        let (worker, _) = worker(StaticFetcher::body(""), broker.clone());

        for payload in [
            &b"not json"[..],
            br#"{"monitor_id":5,"name":"Shop","type":"report"}"#,
            br#"{"monitor_id":9,"name":"Gone","type":"monitor"}"#,
        ] {
            assert!(matches!(worker.process(payload).await, Ok(JobOutcome::Rejected(_))));
        }
        assert_eq!(broker.depth(Channel::Notifications), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_publishes_nothing() {
        let broker = Arc::new(InMemoryBroker::new());
        let failing = StaticFetcher::error(FetchError::UnexpectedStatus {
            url: "https://example.com/".into(),
            expected: 200,
            actual: 503,
        });
        let (worker, metrics) = worker(failing, broker.clone());

        let outcome = worker.process(br#"{"monitor_id":5,"name":"Shop","type":"monitor"}"#).await;

        assert!(matches!(outcome, Ok(JobOutcome::FetchFailed)));
        assert_eq!(broker.depth(Channel::Notifications), 0);
        assert_eq!(metrics.value(MONITORS_ERRORED_TOTAL, Some("Shop")), Some(1.0));
    }

    #[tokio::test]
    async fn test_run_settles_every_delivery() {
        let broker = Arc::new(InMemoryBroker::new());
        let (worker, _) = worker(StaticFetcher::body("In stock"), broker.clone());
        broker
            .publish(Channel::Schedule, br#"{"monitor_id":5,"name":"Shop","type":"monitor"}"#)
            .await
            .unwrap();
        broker.publish(Channel::Schedule, b"garbage").await.unwrap();

        let token = CancellationToken::new();
        let handle = tokio::spawn(Arc::new(worker).run(token.clone()));
        tokio::time::timeout(Duration::from_secs(5), async {
            while broker.acked() + broker.rejected() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        token.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!((broker.acked(), broker.rejected()), (1, 1));
        assert_eq!(broker.depth(Channel::Notifications), 1);
    }
}
