//! Construction of the `reqwest` clients used for fetching and notifying.

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{Jitter, RetryTransientMiddleware, policies::ExponentialBackoff};

use crate::config::{BaseHttpClientConfig, HttpRetryConfig, JitterSetting};

/// Builds a plain client with the configured connection pool limits.
pub fn build_base_client(config: &BaseHttpClientConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(config.max_idle_per_host)
        .pool_idle_timeout(Some(config.idle_timeout))
        .connect_timeout(config.connect_timeout)
        .build()
}

/// Wraps `base_client` in a middleware that retries transient failures
/// (connection errors, 5xx, 429) with exponential backoff.
pub fn create_retryable_http_client(
    config: &HttpRetryConfig,
    base_client: reqwest::Client,
) -> ClientWithMiddleware {
    let jitter = match config.jitter {
        JitterSetting::None => Jitter::None,
        JitterSetting::Full => Jitter::Full,
    };

    let retry_policy = ExponentialBackoff::builder()
        .jitter(jitter)
        .base(config.base_for_backoff)
        .retry_bounds(config.initial_backoff_ms, config.max_backoff_secs)
        .build_with_max_retries(config.max_retries);

    ClientBuilder::new(base_client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

#[cfg(test)]
mod tests {
    use mockito::Server;

    use super::*;

    #[tokio::test]
    async fn test_retries_server_errors() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("GET", "/")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let config = HttpRetryConfig {
            max_retries: 2,
            initial_backoff_ms: std::time::Duration::from_millis(1),
            max_backoff_secs: std::time::Duration::from_millis(5),
            jitter: JitterSetting::None,
            ..Default::default()
        };
        let base = build_base_client(&BaseHttpClientConfig::default()).unwrap();
        let client = create_retryable_http_client(&config, base);

        let response = client.get(server.url()).send().await.unwrap();
        assert_eq!(response.status(), 503);
        failing.assert_async().await;
    }
}
