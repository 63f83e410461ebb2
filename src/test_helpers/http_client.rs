use std::{sync::Arc, time::Duration};

use reqwest::Client;
use reqwest_middleware::ClientWithMiddleware;

use crate::{
    checkers::CheckerRegistry,
    config::HttpRetryConfig,
    http_client::create_retryable_http_client,
    monitor::MonitorFactory,
    notifiers::{NotifierDeps, NotifierRegistry},
};

/// Creates a notifier HTTP client that never retries, so a failing test
/// server is hit exactly once.
pub fn create_test_http_client() -> Arc<ClientWithMiddleware> {
    let retry_policy = HttpRetryConfig { max_retries: 0, ..Default::default() };
    Arc::new(create_retryable_http_client(&retry_policy, Client::new()))
}

/// A factory with the default checker and notifier registries.
pub fn create_test_factory() -> MonitorFactory {
    MonitorFactory::new(
        CheckerRegistry::default(),
        NotifierRegistry::new(NotifierDeps::new(create_test_http_client(), Duration::from_secs(2))),
    )
}
