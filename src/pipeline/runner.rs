//! Single-binary mode: monitors held in memory, checked by a fixed set of
//! executors fed through a bounded queue.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    fetch::FetcherSet,
    metrics::{
        MONITOR_NEXT_CHECK_AT, MONITOR_STATE, MONITORS_ERRORED_TOTAL, MONITORS_PROCESSED_TOTAL,
        MONITORS_QUEUED, MetricsSink, NOTIFICATIONS_FAILED_TOTAL,
    },
    monitor::Monitor,
};

/// Runs in-memory monitors on their schedules.
pub struct Runner {
    monitors: Vec<Arc<Monitor>>,
    fetchers: FetcherSet,
    metrics: Arc<dyn MetricsSink>,
    tick_interval: Duration,
    concurrency: usize,
    queue_capacity: usize,
}

impl Runner {
    /// Creates a runner with `concurrency` executors and a job queue of
    /// `queue_capacity` monitors.
    pub fn new(
        monitors: Vec<Arc<Monitor>>,
        fetchers: FetcherSet,
        metrics: Arc<dyn MetricsSink>,
        tick_interval: Duration,
        concurrency: usize,
        queue_capacity: usize,
    ) -> Self {
        Self {
            monitors,
            fetchers,
            metrics,
            tick_interval,
            concurrency: concurrency.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Queues every monitor due at `now`. Waits while the queue is full.
    /// Returns the number of queued monitors, or `None` once the executors
    /// are gone.
    async fn enqueue_due(
        &self,
        queue: &mpsc::Sender<Arc<Monitor>>,
        now: DateTime<Utc>,
    ) -> Option<usize> {
        let mut queued = 0;
        for monitor in &self.monitors {
            if !monitor.should_run(now) || !monitor.mark_pending() {
                continue;
            }
            if queue.send(Arc::clone(monitor)).await.is_err() {
                monitor.release_pending();
                return None;
            }
            queued += 1;
            self.metrics.set_gauge(
                MONITORS_QUEUED,
                None,
                (queue.max_capacity() - queue.capacity()) as f64,
            );
        }
        Some(queued)
    }

    /// Ticks and executes until `cancellation_token` fires. Runs in flight
    /// finish before this returns.
    pub async fn run(self, cancellation_token: CancellationToken) {
        let (tx, rx) = mpsc::channel::<Arc<Monitor>>(self.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let fetchers = Arc::new(self.fetchers.clone());

        let mut executors = JoinSet::new();
        for _ in 0..self.concurrency {
            let rx = Arc::clone(&rx);
            let fetchers = Arc::clone(&fetchers);
            let metrics = Arc::clone(&self.metrics);
            let token = cancellation_token.clone();
            executors.spawn(async move {
                loop {
                    let next = tokio::select! {
                        _ = token.cancelled() => None,
                        next = async { rx.lock().await.recv().await } => next,
                    };
                    let Some(monitor) = next else { break };
                    execute(&monitor, &fetchers, metrics.as_ref()).await;
                }
            });
        }
        tracing::info!(
            monitors = self.monitors.len(),
            executors = self.concurrency,
            "Runner started."
        );

        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => break,
                _ = tick.tick() => {
                    let enqueue = self.enqueue_due(&tx, Utc::now());
                    let queued = tokio::select! {
                        _ = cancellation_token.cancelled() => break,
                        queued = enqueue => queued,
                    };
                    match queued {
                        Some(0) => {}
                        Some(queued) => tracing::debug!(queued, "Monitors queued."),
                        None => break,
                    }
                }
            }
        }

        drop(tx);
        while let Some(joined) = executors.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Executor panicked.");
            }
        }
        tracing::info!("Runner stopped.");
    }
}

async fn execute(monitor: &Monitor, fetchers: &FetcherSet, metrics: &dyn MetricsSink) {
    let name = monitor.name();
    match monitor.run(fetchers).await {
        Ok(report) => {
            metrics.increment_counter(MONITORS_PROCESSED_TOTAL, Some(name));
            metrics.set_gauge(MONITOR_STATE, Some(name), if report.matched { 1.0 } else { 0.0 });
            for _ in 0..report.failed_notifications {
                metrics.increment_counter(NOTIFICATIONS_FAILED_TOTAL, Some(name));
            }
        }
        Err(e) => {
            tracing::warn!(monitor = name, error = %e, "Check failed.");
            metrics.increment_counter(MONITORS_ERRORED_TOTAL, Some(name));
        }
    }
    if let Some(next) = monitor.next_check_at() {
        metrics.set_gauge(MONITOR_NEXT_CHECK_AT, Some(name), next.timestamp() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fetch::FetchError,
        metrics::InMemoryMetrics,
        models::CheckDefinition,
        test_helpers::{CountingNotifier, MonitorDefinitionBuilder, StaticFetcher},
    };

    fn monitor(name: &str, notifier: &CountingNotifier) -> Arc<Monitor> {
        let definition = MonitorDefinitionBuilder::new(name)
            .interval(Duration::from_secs(3600))
            .check(CheckDefinition {
                name: "stock".into(),
                kind: "regex".into(),
                path: None,
                value: "In stock".into(),
                expected: true,
            })
            .build();
        let checker = crate::checkers::CheckerRegistry::default()
            .build(&definition.checks[0])
            .unwrap();
        Arc::new(Monitor::new(definition, vec![checker], vec![Arc::new(notifier.clone())]))
    }

    async fn run_until_processed(runner: Runner, metrics: &InMemoryMetrics, expected: usize) {
        let token = CancellationToken::new();
        let handle = tokio::spawn(runner.run(token.clone()));
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let done: f64 = metrics
                    .snapshot()
                    .iter()
                    .filter(|(k, _)| {
                        k.starts_with(MONITORS_PROCESSED_TOTAL) || k.starts_with(MONITORS_ERRORED_TOTAL)
                    })
                    .map(|(_, v)| v)
                    .sum();
                if done as usize >= expected {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        // A few more ticks must not run anything again.
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_each_due_monitor_runs_once() {
        let notifier = CountingNotifier::new("count");
        let fetcher = StaticFetcher::body("In stock");
        let metrics = Arc::new(InMemoryMetrics::new());
        let monitors: Vec<_> =
            ["a", "b", "c", "d", "e"].iter().map(|n| monitor(n, &notifier)).collect();
        let runner = Runner::new(
            monitors.clone(),
            FetcherSet::uniform(Arc::new(fetcher.clone())),
            metrics.clone(),
            Duration::from_millis(10),
            2,
            1,
        );

        run_until_processed(runner, &metrics, 5).await;

        assert_eq!(fetcher.calls(), 5);
        assert_eq!(notifier.calls(), 5);
        assert!(monitors.iter().all(|m| m.last_seen_state() && !m.state().check_pending));
        assert_eq!(metrics.value(MONITOR_STATE, Some("c")), Some(1.0));
    }

    #[tokio::test]
    async fn test_failed_fetch_still_advances_schedule() {
        let notifier = CountingNotifier::new("count");
        let fetcher = StaticFetcher::error(FetchError::Request {
            url: "https://example.com/".into(),
            reason: "connection refused".into(),
        });
        let metrics = Arc::new(InMemoryMetrics::new());
        let shop = monitor("shop", &notifier);
        let runner = Runner::new(
            vec![shop.clone()],
            FetcherSet::uniform(Arc::new(fetcher.clone())),
            metrics.clone(),
            Duration::from_millis(10),
            1,
            4,
        );

        run_until_processed(runner, &metrics, 1).await;

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(notifier.calls(), 0);
        assert!(shop.next_check_at().is_some_and(|next| next > Utc::now()));
        assert_eq!(metrics.value(MONITORS_ERRORED_TOTAL, Some("shop")), Some(1.0));
    }
}
