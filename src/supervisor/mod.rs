//! The Supervisor module manages the lifecycle of the sitewatch services.
//!
//! The `SupervisorBuilder` wires the services of one [`Role`] together. The
//! `Supervisor` then runs them as supervised tasks, listens for Ctrl+C and
//! SIGTERM, and shuts everything down when a signal arrives or a service
//! fails. A failing service never leaves the others running in a
//! partially-functional process.

mod builder;

use std::{sync::Arc, time::Duration};

pub use builder::SupervisorBuilder;
use thiserror::Error;
use tokio::{signal, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    config::AppConfig,
    http_client::HttpClientPoolError,
    metrics::InMemoryMetrics,
    persistence::{PersistenceError, SqliteStateRepository},
    pipeline::{NotificationDispatcher, PipelineError, Runner, Scheduler, Worker},
};

/// Which services a process runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    /// Single-binary mode over in-memory monitors.
    #[default]
    Run,
    /// The scheduler role only.
    Scheduler,
    /// The worker role only.
    Worker,
    /// The notifier role only.
    Notifier,
    /// All three pipeline roles over one broker.
    Pipeline,
}

/// Represents the set of errors that can occur during the supervisor's
/// operation.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A required configuration was not provided to the `SupervisorBuilder`.
    #[error("Missing configuration for Supervisor")]
    MissingConfig,

    /// The role needs the monitor store.
    #[error("Missing state repository for Supervisor")]
    MissingStateRepository,

    /// The role needs a message broker.
    #[error("Missing message broker for Supervisor")]
    MissingBroker,

    /// Single-binary mode needs monitor definitions.
    #[error("Missing monitor definitions for Supervisor")]
    MissingMonitors,

    /// The notifier HTTP client could not be created.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] HttpClientPoolError),

    /// The fetch HTTP client could not be created.
    #[error("Fetcher creation failed: {0}")]
    Fetcher(#[from] reqwest::Error),

    /// The monitor store failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// A supervised service stopped with an error.
    #[error("Service failed: {0}")]
    Service(#[from] PipelineError),

    /// A supervised task panicked.
    #[error("Service task failed: {0}")]
    TaskFailed(String),
}

pub(crate) enum Service {
    Runner(Runner),
    Scheduler(Scheduler),
    Worker(Arc<Worker>),
    Notifier(NotificationDispatcher),
}

impl Service {
    fn name(&self) -> &'static str {
        match self {
            Service::Runner(_) => "runner",
            Service::Scheduler(_) => "scheduler",
            Service::Worker(_) => "worker",
            Service::Notifier(_) => "notifier",
        }
    }

    async fn run(self, token: CancellationToken) -> Result<(), PipelineError> {
        match self {
            Service::Runner(runner) => {
                runner.run(token).await;
                Ok(())
            }
            Service::Scheduler(scheduler) => scheduler.run(token).await,
            Service::Worker(worker) => worker.run(token).await,
            Service::Notifier(dispatcher) => dispatcher.run(token).await,
        }
    }
}

/// The primary runtime manager for the application.
///
/// Owns the services of one role and is responsible for their startup,
/// shutdown, and health monitoring.
pub struct Supervisor {
    /// Shared application configuration.
    config: Arc<AppConfig>,

    /// The services to run.
    services: Vec<Service>,

    /// Metrics recorded by the services and summarized in the log.
    metrics: Arc<InMemoryMetrics>,

    /// The store, closed on shutdown.
    state: Option<Arc<SqliteStateRepository>>,

    /// A token used to signal a graceful shutdown to all supervised tasks.
    cancellation_token: CancellationToken,

    /// A set of all spawned tasks that the supervisor is actively managing.
    join_set: JoinSet<Result<(), PipelineError>>,
}

impl Supervisor {
    pub(crate) fn new(
        config: AppConfig,
        services: Vec<Service>,
        metrics: Arc<InMemoryMetrics>,
        state: Option<Arc<SqliteStateRepository>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            services,
            metrics,
            state,
            cancellation_token: CancellationToken::new(),
            join_set: JoinSet::new(),
        }
    }

    /// Returns a new `SupervisorBuilder` instance.
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// A handle that stops the supervisor when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// The metrics recorded by the services.
    pub fn metrics(&self) -> Arc<InMemoryMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Runs every service until a shutdown signal, a cancellation or a
    /// service failure, then cleans up within the shutdown timeout.
    ///
    /// Returns the first service failure, if any.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let cancellation_token = self.cancellation_token.clone();
        self.join_set.spawn(async move {
            wait_for_signal(&cancellation_token).await;
            // Notify all other tasks to begin shutting down.
            cancellation_token.cancel();
            Ok(())
        });

        let metrics = Arc::clone(&self.metrics);
        let summary_token = self.cancellation_token.clone();
        let summary_interval = self.config.metrics_log_interval_secs;
        self.join_set.spawn(async move {
            log_metrics(metrics, summary_interval, summary_token).await;
            Ok(())
        });

        let mut remaining = self.services.len();
        for service in std::mem::take(&mut self.services) {
            tracing::info!(service = service.name(), "Starting service.");
            self.join_set.spawn(service.run(self.cancellation_token.clone()));
        }

        let mut failure = None;
        loop {
            tokio::select! {
                maybe_result = self.join_set.join_next() => {
                    match maybe_result {
                        Some(Ok(Ok(()))) => {
                            remaining = remaining.saturating_sub(1);
                            if remaining == 0 {
                                tracing::info!("All services have stopped.");
                                self.cancellation_token.cancel();
                            }
                        }
                        Some(Ok(Err(e))) => {
                            tracing::error!(error = %e, "A service failed. Initiating shutdown.");
                            failure.get_or_insert(SupervisorError::Service(e));
                            self.cancellation_token.cancel();
                        }
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "A critical task failed. Initiating shutdown.");
                            failure.get_or_insert(SupervisorError::TaskFailed(e.to_string()));
                            self.cancellation_token.cancel();
                        }
                        None => break,
                    }
                }
                _ = self.cancellation_token.cancelled() => break,
            }
        }

        // Let services finish their in-flight work, then stop whatever is left.
        let shutdown_timeout = self.config.shutdown_timeout;
        let drain = async {
            while let Some(joined) = self.join_set.join_next().await {
                if let Ok(Err(e)) = joined {
                    tracing::warn!(error = %e, "Service reported an error during shutdown.");
                }
            }
        };
        if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
            tracing::warn!(
                "Services did not stop within the timeout of {:?}. Aborting them.",
                shutdown_timeout
            );
        }
        self.join_set.shutdown().await;
        tracing::info!("All supervised tasks have completed.");

        self.metrics.log_summary();
        if let Some(state) = &self.state {
            state.close().await;
        }

        tracing::info!("Supervisor shutdown complete.");
        failure.map_or(Ok(()), Err)
    }
}

async fn wait_for_signal(cancellation_token: &CancellationToken) {
    let ctrl_c = signal::ctrl_c();
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register SIGTERM handler.");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("SIGINT (Ctrl+C) received, initiating graceful shutdown."),
        _ = terminate => tracing::info!("SIGTERM received, initiating graceful shutdown."),
        _ = cancellation_token.cancelled() => {}
    }
}

async fn log_metrics(metrics: Arc<InMemoryMetrics>, every: Duration, token: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately, there is nothing to report yet.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => metrics.log_summary(),
        }
    }
}
