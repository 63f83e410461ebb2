use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;

use super::{Notifier, NotifierError, summary_line};
use crate::models::ResultSet;

/// The public Pushsafer endpoint.
pub const PUSHSAFER_API_URL: &str = "https://www.pushsafer.com/api";

#[derive(Debug, Deserialize)]
struct PushSaferResponse {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    available: Option<serde_json::Value>,
}

/// Sends a push message through Pushsafer to all of the account's devices.
#[derive(Debug)]
pub struct PushSaferNotifier {
    name: String,
    private_key: String,
    api_url: String,
    /// Extra form fields passed through as-is (sound, icon, vibration, ...).
    options: BTreeMap<String, String>,
    client: Arc<ClientWithMiddleware>,
    timeout: Duration,
}

impl PushSaferNotifier {
    /// Creates a notifier. `options` are sent as additional form fields.
    pub fn new(
        name: impl Into<String>,
        private_key: impl Into<String>,
        options: BTreeMap<String, String>,
        client: Arc<ClientWithMiddleware>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            private_key: private_key.into(),
            api_url: PUSHSAFER_API_URL.to_string(),
            options,
            client,
            timeout,
        }
    }

    /// Overrides the API endpoint.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn form(&self, name: &str, display_url: &str, results: &ResultSet) -> BTreeMap<String, String> {
        let mut form = self.options.clone();
        form.insert("k".into(), self.private_key.clone());
        form.insert("t".into(), name.to_string());
        form.insert("u".into(), display_url.to_string());
        form.insert("d".into(), "a".into());
        form.insert("m".into(), summary_line(name, display_url, results));
        form
    }
}

#[async_trait]
impl Notifier for PushSaferNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "pushsafer"
    }

    #[tracing::instrument(skip(self, results), fields(notifier = %self.name))]
    async fn notify(
        &self,
        name: &str,
        display_url: &str,
        results: &ResultSet,
    ) -> Result<(), NotifierError> {
        let body = self
            .client
            .post(&self.api_url)
            .timeout(self.timeout)
            .form(&self.form(name, display_url, results))
            .send()
            .await?
            .text()
            .await?;

        let reply: PushSaferResponse = serde_json::from_str(&body)
            .map_err(|_| NotifierError::InvalidResponse(format!("Pushsafer replied '{body}'")))?;
        if reply.status == 0 {
            return Err(NotifierError::NotifyFailed(
                reply.error.unwrap_or_else(|| "Pushsafer rejected the message".to_string()),
            ));
        }

        tracing::debug!(available = ?reply.available, "Pushsafer message sent.");
        Ok(())
    }
}
