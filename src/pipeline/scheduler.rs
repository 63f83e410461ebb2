//! The scheduler role: decides which monitors are due and queues jobs for
//! them.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::PipelineError;
use crate::{
    metrics::{MONITOR_NEXT_CHECK_AT, MetricsSink},
    models::ScheduleJob,
    monitor::{Monitor, MonitorFactory},
    persistence::MonitorRepository,
    queue::{Channel, MessageBroker},
};

/// Publishes a [`ScheduleJob`] for every due monitor on each tick.
///
/// The scheduler keeps its own copy of every monitor. For the scheduler the
/// publish is the run, so a monitor's schedule advances as soon as the broker
/// accepts its job.
pub struct Scheduler {
    repository: Arc<dyn MonitorRepository>,
    factory: MonitorFactory,
    broker: Arc<dyn MessageBroker>,
    metrics: Arc<dyn MetricsSink>,
    tick_interval: Duration,
    refresh_interval: Duration,
    monitors: Vec<Arc<Monitor>>,
}

impl Scheduler {
    /// Creates a scheduler. No monitors are loaded until the first refresh.
    pub fn new(
        repository: Arc<dyn MonitorRepository>,
        factory: MonitorFactory,
        broker: Arc<dyn MessageBroker>,
        metrics: Arc<dyn MetricsSink>,
        tick_interval: Duration,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            repository,
            factory,
            broker,
            metrics,
            tick_interval,
            refresh_interval,
            monitors: Vec::new(),
        }
    }

    /// The monitors currently scheduled.
    pub fn monitors(&self) -> &[Arc<Monitor>] {
        &self.monitors
    }

    /// Reloads monitors from the store. Monitors that were already known keep
    /// their run state. Returns the number of scheduled monitors.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn refresh(&mut self) -> Result<usize, PipelineError> {
        let definitions = self.repository.definitions().await?;
        let fresh = self.factory.build_valid(definitions);

        let previous: HashMap<i64, Arc<Monitor>> =
            self.monitors.drain(..).map(|m| (m.id(), m)).collect();
        for monitor in &fresh {
            if let Some(old) = previous.get(&monitor.id()) {
                monitor.adopt_state(old);
            }
        }

        self.monitors = fresh;
        tracing::debug!(count = self.monitors.len(), "Monitors refreshed.");
        Ok(self.monitors.len())
    }

    /// Queues a job for every monitor due at `now`. Returns the number of
    /// published jobs.
    pub async fn tick(&self, now: DateTime<Utc>) -> usize {
        let mut published = 0;
        for monitor in &self.monitors {
            if !monitor.should_run(now) || !monitor.mark_pending() {
                continue;
            }
            match self.dispatch(monitor).await {
                Ok(()) => {
                    monitor.complete_dispatch(now);
                    published += 1;
                    if let Some(next) = monitor.next_check_at() {
                        self.metrics.set_gauge(
                            MONITOR_NEXT_CHECK_AT,
                            Some(monitor.name()),
                            next.timestamp() as f64,
                        );
                    }
                }
                Err(e) => {
                    // Not queued, so the monitor stays due for the next tick.
                    monitor.release_pending();
                    tracing::warn!(monitor = monitor.name(), error = %e, "Failed to queue job.");
                }
            }
        }
        published
    }

    async fn dispatch(&self, monitor: &Monitor) -> Result<(), PipelineError> {
        let job = ScheduleJob::monitor(monitor.id(), monitor.name());
        let payload = serde_json::to_vec(&job)?;
        self.broker.publish(Channel::Schedule, &payload).await?;
        tracing::debug!(monitor_id = job.monitor_id, monitor = %job.name, "Job queued.");
        Ok(())
    }

    /// Ticks until `cancellation_token` fires. The initial load must succeed,
    /// later refresh failures are logged and the previous monitors are kept.
    pub async fn run(mut self, cancellation_token: CancellationToken) -> Result<(), PipelineError> {
        let count = self.refresh().await?;
        tracing::info!(count, "Scheduler started.");

        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refresh = tokio::time::interval(self.refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first refresh tick completes immediately and the load just
        // happened.
        refresh.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => break,
                _ = refresh.tick() => {
                    if let Err(e) = self.refresh().await {
                        tracing::error!(error = %e, "Failed to refresh monitors, keeping the current set.");
                    }
                }
                _ = tick.tick() => {
                    let published = self.tick(Utc::now()).await;
                    if published > 0 {
                        tracing::debug!(published, "Scheduler tick.");
                    }
                }
            }
        }

        tracing::info!("Scheduler stopped.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::StreamExt;

    use super::*;
    use crate::{
        metrics::{InMemoryMetrics, NoopMetrics},
        models::MonitorDefinition,
        persistence::MockMonitorRepository,
        queue::{InMemoryBroker, MockMessageBroker, QueueError},
        test_helpers::{MonitorDefinitionBuilder, create_test_factory},
    };

    fn repository(definitions: Vec<MonitorDefinition>) -> Arc<dyn MonitorRepository> {
        let mut repo = MockMonitorRepository::new();
        repo.expect_definitions().returning(move || Ok(definitions.clone()));
        Arc::new(repo)
    }

    fn definitions() -> Vec<MonitorDefinition> {
        vec![
            MonitorDefinitionBuilder::new("Shop").id(1).build(),
            MonitorDefinitionBuilder::new("Api").id(2).build(),
        ]
    }

    fn scheduler(broker: Arc<dyn MessageBroker>, metrics: Arc<dyn MetricsSink>) -> Scheduler {
        Scheduler::new(
            repository(definitions()),
            create_test_factory(),
            broker,
            metrics,
            Duration::from_millis(10),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_tick_publishes_due_monitors_once() {
        let broker = Arc::new(InMemoryBroker::new());
        let metrics = Arc::new(InMemoryMetrics::new());
        let mut scheduler = scheduler(broker.clone(), metrics.clone());
        assert_eq!(scheduler.refresh().await.unwrap(), 2);

        let now = Utc::now();
        assert_eq!(scheduler.tick(now).await, 2);
        assert_eq!(scheduler.tick(now).await, 0);
        assert_eq!(broker.depth(Channel::Schedule), 2);
        assert!(scheduler.monitors().iter().all(|m| !m.state().check_pending));
        assert!(metrics.value(MONITOR_NEXT_CHECK_AT, Some("Shop")).is_some());

        let mut jobs = broker.subscribe(Channel::Schedule, "test").await.unwrap();
        let first = jobs.next().await.unwrap().unwrap();
        let job: ScheduleJob = serde_json::from_slice(first.payload()).unwrap();
        assert_eq!(job, ScheduleJob::monitor(1, "Shop"));
    }

    #[tokio::test]
    async fn test_failed_publish_releases_pending() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut broker = MockMessageBroker::new();
        let counter = calls.clone();
        broker.expect_publish().returning(move |channel, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(QueueError::Closed(channel))
            } else {
                Ok(())
            }
        });
        let mut scheduler = scheduler(Arc::new(broker), Arc::new(NoopMetrics));
        scheduler.refresh().await.unwrap();

        let now = Utc::now();
        assert_eq!(scheduler.tick(now).await, 1);
        let shop = &scheduler.monitors()[0];
        assert!(!shop.state().check_pending);
        assert!(shop.should_run(now));

        assert_eq!(scheduler.tick(now).await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_refresh_keeps_run_state() {
        let broker = Arc::new(InMemoryBroker::new());
        let mut scheduler = scheduler(broker.clone(), Arc::new(NoopMetrics));
        scheduler.refresh().await.unwrap();
        let now = Utc::now();
        scheduler.tick(now).await;
        let next = scheduler.monitors()[0].next_check_at();

        scheduler.refresh().await.unwrap();

        assert_eq!(scheduler.monitors()[0].next_check_at(), next);
        assert_eq!(scheduler.tick(now).await, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let broker = Arc::new(InMemoryBroker::new());
        let scheduler = scheduler(broker.clone(), Arc::new(NoopMetrics));
        let token = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(broker.depth(Channel::Schedule), 2);
    }
}
