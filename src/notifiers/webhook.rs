//! Signed JSON webhooks.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{
    Method,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use reqwest_middleware::ClientWithMiddleware;
use serde_json::json;
use sha2::Sha256;

use super::{Notifier, NotifierError, summary_line};
use crate::models::ResultSet;

type HmacSha256 = Hmac<Sha256>;

/// Sends the full result set as JSON to an arbitrary endpoint.
///
/// With a secret configured, the body is signed with HMAC-SHA256 over the
/// serialized payload followed by the millisecond timestamp. The signature
/// and timestamp travel in `X-Signature` and `X-Timestamp`.
#[derive(Debug)]
pub struct WebhookNotifier {
    name: String,
    url: String,
    method: Method,
    secret: Option<String>,
    client: Arc<ClientWithMiddleware>,
    timeout: Duration,
}

impl WebhookNotifier {
    /// Creates a notifier. `method` defaults to POST.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        method: Option<Method>,
        secret: Option<String>,
        client: Arc<ClientWithMiddleware>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            method: method.unwrap_or(Method::POST),
            secret,
            client,
            timeout,
        }
    }

    /// The JSON body sent for one alert.
    pub fn payload(name: &str, display_url: &str, results: &ResultSet) -> serde_json::Value {
        json!({
            "name": name,
            "display_url": display_url,
            "matched": results.matched(),
            "summary": summary_line(name, display_url, results),
            "results": results.results(),
        })
    }

    /// The hex HMAC-SHA256 of `payload` followed by `timestamp_ms`.
    pub fn sign_payload(
        secret: &str,
        payload: &serde_json::Value,
        timestamp_ms: i64,
    ) -> Result<String, NotifierError> {
        // `new_from_slice` accepts empty keys.
        if secret.is_empty() {
            return Err(NotifierError::InvalidRequest("webhook secret is empty".to_string()));
        }

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| NotifierError::InvalidRequest(format!("invalid secret: {e}")))?;
        let serialized = serde_json::to_string(payload)
            .map_err(|e| NotifierError::InvalidRequest(format!("failed to serialize payload: {e}")))?;
        mac.update(format!("{serialized}{timestamp_ms}").as_bytes());

        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn headers(&self, payload: &serde_json::Value) -> Result<HeaderMap, NotifierError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/json"),
        );

        if let Some(secret) = &self.secret {
            let timestamp = Utc::now().timestamp_millis();
            let signature = Self::sign_payload(secret, payload, timestamp)?;
            let invalid = |e: reqwest::header::InvalidHeaderValue| {
                NotifierError::InvalidRequest(format!("invalid header value: {e}"))
            };
            headers.insert(
                HeaderName::from_static("x-signature"),
                HeaderValue::from_str(&signature).map_err(invalid)?,
            );
            headers.insert(
                HeaderName::from_static("x-timestamp"),
                HeaderValue::from_str(&timestamp.to_string()).map_err(invalid)?,
            );
        }
        Ok(headers)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "webhook"
    }

    #[tracing::instrument(skip(self, results), fields(notifier = %self.name))]
    async fn notify(
        &self,
        name: &str,
        display_url: &str,
        results: &ResultSet,
    ) -> Result<(), NotifierError> {
        let payload = Self::payload(name, display_url, results);
        let response = self
            .client
            .request(self.method.clone(), self.url.as_str())
            .headers(self.headers(&payload)?)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifierError::NotifyFailed(format!(
                "Webhook request failed with status: {status}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};

    use super::*;
    use crate::{
        models::{Aggregation, CheckResult},
        test_helpers::create_test_http_client,
    };

    fn results() -> ResultSet {
        ResultSet::from_results(
            Aggregation::AllMustPass,
            vec![CheckResult::new("RegexChecker", "stock - 'x' found", false, None)],
        )
    }

    fn notifier(url: &str, secret: Option<&str>, method: Option<Method>) -> WebhookNotifier {
        WebhookNotifier::new(
            "hook",
            url,
            method,
            secret.map(String::from),
            create_test_http_client(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_signature_is_deterministic() {
        let payload = json!({"name": "Shop"});
        let a = WebhookNotifier::sign_payload("secret", &payload, 1_700_000_000_000).unwrap();
        let b = WebhookNotifier::sign_payload("secret", &payload, 1_700_000_000_000).unwrap();
        let c = WebhookNotifier::sign_payload("secret", &payload, 1_700_000_000_001).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(hex::decode(&a).is_ok());
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        assert!(matches!(
            WebhookNotifier::sign_payload("", &json!({}), 0),
            Err(NotifierError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_signed_delivery() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("x-signature", Matcher::Regex("^[0-9a-f]{64}$".to_string()))
            .match_header("x-timestamp", Matcher::Regex("^[0-9]+$".to_string()))
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "name": "Shop",
                "matched": false,
                "summary": "Shop does *not* match checks!"
            })))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        notifier(&server.url(), Some("top-secret"), None)
            .notify("Shop", "https://shop/p", &results())
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unsigned_put() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/alerts")
            .match_header("x-signature", Matcher::Missing)
            .with_status(200)
            .create_async()
            .await;

        notifier(&format!("{}/alerts", server.url()), None, Some(Method::PUT))
            .notify("Shop", "https://shop/p", &results())
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status() {
        let mut server = Server::new_async().await;
        let _mock = server.mock("POST", "/").with_status(403).create_async().await;

        let err = notifier(&server.url(), None, None)
            .notify("Shop", "https://shop/p", &results())
            .await
            .unwrap_err();

        assert!(matches!(err, NotifierError::NotifyFailed(msg) if msg.contains("403")));
    }
}
