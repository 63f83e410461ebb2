//! This module provides the `SupervisorBuilder` for constructing a `Supervisor`.

use std::sync::Arc;

use super::{Role, Service, Supervisor, SupervisorError};
use crate::{
    checkers::CheckerRegistry,
    config::AppConfig,
    fetch::FetcherSet,
    http_client::HttpClientPool,
    metrics::{InMemoryMetrics, MetricsSink},
    models::MonitorDefinition,
    monitor::MonitorFactory,
    notifiers::{NotifierDeps, NotifierRegistry},
    persistence::{MonitorRepository, NotifierRepository, SqliteStateRepository},
    pipeline::{NotificationDispatcher, Runner, Scheduler, Worker},
    queue::{InMemoryBroker, MessageBroker},
};

/// A builder for creating a `Supervisor` instance.
#[derive(Default)]
pub struct SupervisorBuilder {
    config: Option<AppConfig>,
    role: Role,
    state: Option<Arc<SqliteStateRepository>>,
    broker: Option<Arc<dyn MessageBroker>>,
    definitions: Option<Vec<MonitorDefinition>>,
    fetchers: Option<FetcherSet>,
}

impl SupervisorBuilder {
    /// Creates a new, empty `SupervisorBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the application configuration for the `Supervisor`.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Selects the services to run.
    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Sets the monitor store. Required by every pipeline role, optional in
    /// single-binary mode where it only backs the `log` notifier.
    pub fn state(mut self, state: Arc<SqliteStateRepository>) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets the broker. Required by the single pipeline roles. The combined
    /// pipeline falls back to an in-memory broker.
    pub fn broker(mut self, broker: Arc<dyn MessageBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Sets the monitors for single-binary mode.
    pub fn definitions(mut self, definitions: Vec<MonitorDefinition>) -> Self {
        self.definitions = Some(definitions);
        self
    }

    /// Replaces the fetchers built from the configuration.
    pub fn fetchers(mut self, fetchers: FetcherSet) -> Self {
        self.fetchers = Some(fetchers);
        self
    }

    /// Assembles and validates the components to build a `Supervisor`.
    pub async fn build(self) -> Result<Supervisor, SupervisorError> {
        let config = self.config.ok_or(SupervisorError::MissingConfig)?;
        let metrics = Arc::new(InMemoryMetrics::new());
        let sink: Arc<dyn MetricsSink> = metrics.clone();

        let pool = HttpClientPool::new(config.http_base_config.clone());
        let mut deps =
            NotifierDeps::from_pool(&pool, &config.http_retry_config, config.notify_timeout_secs)
                .await?;
        if let Some(state) = &self.state {
            deps = deps.with_log_store(state.clone());
        }
        let registry = NotifierRegistry::new(deps);
        let factory = MonitorFactory::new(CheckerRegistry::default(), registry.clone());
        let fetchers = match self.fetchers {
            Some(fetchers) => fetchers,
            None => FetcherSet::from_config(&config)?,
        };

        let needs_state = || self.state.clone().ok_or(SupervisorError::MissingStateRepository);
        let needs_broker = || self.broker.clone().ok_or(SupervisorError::MissingBroker);

        let scheduler = |state: Arc<SqliteStateRepository>, broker: Arc<dyn MessageBroker>| {
            Service::Scheduler(Scheduler::new(
                state,
                factory.clone(),
                broker,
                sink.clone(),
                config.tick_interval_ms,
                config.monitor_refresh_interval_secs,
            ))
        };
        let worker = |state: Arc<SqliteStateRepository>, broker: Arc<dyn MessageBroker>| {
            Service::Worker(Arc::new(Worker::new(
                state,
                factory.clone(),
                fetchers.clone(),
                broker,
                sink.clone(),
                config.worker_concurrency,
            )))
        };
        let notifier = |state: Arc<SqliteStateRepository>, broker: Arc<dyn MessageBroker>| {
            Service::Notifier(NotificationDispatcher::new(
                state.clone() as Arc<dyn MonitorRepository>,
                state as Arc<dyn NotifierRepository>,
                registry.clone(),
                broker,
                sink.clone(),
            ))
        };

        let services = match self.role {
            Role::Run => {
                let definitions = self.definitions.clone().ok_or(SupervisorError::MissingMonitors)?;
                let monitors = factory.build_valid(definitions);
                tracing::info!(count = monitors.len(), "Loaded monitors.");
                vec![Service::Runner(Runner::new(
                    monitors,
                    fetchers.clone(),
                    sink.clone(),
                    config.tick_interval_ms,
                    config.worker_concurrency,
                    config.job_queue_capacity,
                ))]
            }
            Role::Scheduler => vec![scheduler(needs_state()?, needs_broker()?)],
            Role::Worker => vec![worker(needs_state()?, needs_broker()?)],
            Role::Notifier => vec![notifier(needs_state()?, needs_broker()?)],
            Role::Pipeline => {
                let state = needs_state()?;
                let broker = self
                    .broker
                    .clone()
                    .unwrap_or_else(|| Arc::new(InMemoryBroker::new()) as Arc<dyn MessageBroker>);
                vec![
                    scheduler(state.clone(), broker.clone()),
                    worker(state.clone(), broker.clone()),
                    notifier(state, broker),
                ]
            }
        };

        tracing::debug!(role = ?self.role, services = services.len(), "Supervisor assembled.");
        Ok(Supervisor::new(config, services, metrics, self.state))
    }
}
