use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::{FetchError, FetchRequest, FetchedArtifact, Fetcher};
use crate::{config::BaseHttpClientConfig, http_client::build_base_client};

/// Fetches the raw body with a single GET.
///
/// There are no retries: a failure fails the run and the schedule decides
/// when to try again.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests time out after `timeout`.
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Creates a fetcher with its own client.
    pub fn from_config(config: &BaseHttpClientConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_base_client(config)?, timeout))
    }

    fn header_map(request: &FetchRequest) -> Result<HeaderMap, FetchError> {
        let mut headers = HeaderMap::with_capacity(request.headers.len());
        for (key, value) in &request.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| FetchError::InvalidHeader(key.clone()))?;
            let value =
                HeaderValue::from_str(value).map_err(|_| FetchError::InvalidHeader(key.clone()))?;
            headers.append(name, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[tracing::instrument(skip(self, request), fields(url = %request.url))]
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedArtifact, FetchError> {
        let url = request.url.to_string();
        let response = self
            .client
            .get(request.url.clone())
            .headers(Self::header_map(request)?)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::Request { url: url.clone(), reason: e.to_string() })?;

        let status = response.status().as_u16();
        if status != request.expected_status_code {
            return Err(FetchError::UnexpectedStatus {
                url,
                expected: request.expected_status_code,
                actual: status,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Request { url, reason: e.to_string() })?;
        tracing::debug!(bytes = body.len(), "Fetched target.");
        Ok(FetchedArtifact::Static(body))
    }
}
