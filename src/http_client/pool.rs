//! A shared pool of retrying HTTP clients for notifiers.

use std::{collections::HashMap, sync::Arc};

use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;
use tokio::sync::RwLock;

use super::client::{build_base_client, create_retryable_http_client};
use crate::config::{BaseHttpClientConfig, HttpRetryConfig};

/// Errors that can occur within the `HttpClientPool`.
#[derive(Debug, Error)]
pub enum HttpClientPoolError {
    /// An error occurred while building the underlying `reqwest::Client`.
    #[error("Failed to create HTTP client: {0}")]
    HttpClientBuildError(String),
}

/// Hands out one retrying client per retry policy.
///
/// Slack, Pushsafer and webhook notifiers with the same policy share a
/// client and therefore its connection pool.
pub struct HttpClientPool {
    base_config: BaseHttpClientConfig,
    clients: Arc<RwLock<HashMap<String, Arc<ClientWithMiddleware>>>>,
}

impl HttpClientPool {
    /// Creates an empty pool whose clients use `base_config`.
    pub fn new(base_config: BaseHttpClientConfig) -> Self {
        Self {
            base_config,
            clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the client for `retry_policy`, creating it on first use.
    pub async fn get_or_create(
        &self,
        retry_policy: &HttpRetryConfig,
    ) -> Result<Arc<ClientWithMiddleware>, HttpClientPoolError> {
        let key = format!("{retry_policy:?}");

        // Fast path: Check if the client already exists with a read lock.
        if let Some(client) = self.clients.read().await.get(&key) {
            return Ok(client.clone());
        }

        // Slow path: If not found, acquire a write lock to create it.
        let mut clients = self.clients.write().await;
        // Double-check: Another thread might have created the client while we were
        // waiting for the write lock.
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let base_client = build_base_client(&self.base_config)
            .map_err(|e| HttpClientPoolError::HttpClientBuildError(e.to_string()))?;

        let new_client = Arc::new(create_retryable_http_client(retry_policy, base_client));
        clients.insert(key, new_client.clone());

        Ok(new_client)
    }

    /// Returns the number of active HTTP clients in the pool.
    #[cfg(test)]
    pub async fn get_active_client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

impl Default for HttpClientPool {
    fn default() -> Self {
        Self::new(BaseHttpClientConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_pool() -> HttpClientPool {
        HttpClientPool::new(BaseHttpClientConfig {
            max_idle_per_host: 2,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_same_policy_shares_a_client() {
        let pool = create_pool();
        assert_eq!(pool.get_active_client_count().await, 0);

        let policy = HttpRetryConfig::default();
        let first = pool.get_or_create(&policy).await.unwrap();
        let second = pool.get_or_create(&policy.clone()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.get_active_client_count().await, 1);
    }

    #[tokio::test]
    async fn test_policies_get_separate_clients() {
        let pool = create_pool();
        let slack = pool.get_or_create(&HttpRetryConfig::default()).await.unwrap();
        let webhook = pool
            .get_or_create(&HttpRetryConfig {
                max_retries: 0,
                jitter: crate::config::JitterSetting::None,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(!Arc::ptr_eq(&slack, &webhook));
        assert_eq!(pool.get_active_client_count().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_creates_one_client() {
        let pool = Arc::new(create_pool());
        let tasks = (0..8).map(|_| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.get_or_create(&HttpRetryConfig::default()).await })
        });

        for result in futures::future::join_all(tasks).await {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(pool.get_active_client_count().await, 1);
    }
}
