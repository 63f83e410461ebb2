//! One-shot commands of the binary.

pub mod check;
pub mod import;

use thiserror::Error;

pub use check::{CheckArgs, CheckReport};
pub use import::{ImportArgs, ImportSummary};

use crate::{
    config::{AppConfig, ConfigurationError, LoaderError},
    http_client::{HttpClientPool, HttpClientPoolError},
    monitor::MonitorError,
    notifiers::NotifierDeps,
    persistence::PersistenceError,
};

/// Errors of the one-shot commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The monitor file could not be loaded.
    #[error("Monitor loading error: {0}")]
    MonitorLoading(#[from] LoaderError),

    /// A monitor in the file is invalid.
    #[error("Invalid monitor: {0}")]
    InvalidMonitor(#[from] ConfigurationError),

    /// No monitor has the requested name.
    #[error("No monitor named '{0}'")]
    UnknownMonitor(String),

    /// The checked monitor could not be fetched.
    #[error("Check failed: {0}")]
    Check(#[from] MonitorError),

    /// The fetch client could not be created.
    #[error("Fetcher creation failed: {0}")]
    Fetcher(#[from] reqwest::Error),

    /// The notifier client could not be created.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] HttpClientPoolError),

    /// The monitor store failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// The report could not be encoded.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

async fn notifier_deps(config: &AppConfig) -> Result<NotifierDeps, CommandError> {
    let pool = HttpClientPool::new(config.http_base_config.clone());
    Ok(NotifierDeps::from_pool(&pool, &config.http_retry_config, config.notify_timeout_secs).await?)
}
