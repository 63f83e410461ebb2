use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;

use super::{Notifier, NotifierError, result_lines, summary_line};
use crate::models::ResultSet;

#[derive(Debug, Serialize)]
struct TextObject<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: String,
}

#[derive(Debug, Serialize)]
struct Block<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: TextObject<'a>,
}

#[derive(Debug, Serialize)]
struct SlackMessage<'a> {
    text: String,
    blocks: Vec<Block<'a>>,
}

fn section(text: String) -> Block<'static> {
    Block { kind: "section", text: TextObject { kind: "mrkdwn", text } }
}

/// Posts to a Slack incoming webhook.
#[derive(Debug)]
pub struct SlackNotifier {
    name: String,
    webhook: String,
    client: Arc<ClientWithMiddleware>,
    timeout: Duration,
}

impl SlackNotifier {
    /// Creates a notifier posting to `webhook`.
    pub fn new(
        name: impl Into<String>,
        webhook: impl Into<String>,
        client: Arc<ClientWithMiddleware>,
        timeout: Duration,
    ) -> Self {
        Self { name: name.into(), webhook: webhook.into(), client, timeout }
    }

    fn message(name: &str, display_url: &str, results: &ResultSet) -> SlackMessage<'static> {
        let summary = summary_line(name, display_url, results);
        let mut blocks = vec![section(summary.clone())];
        blocks.extend(result_lines(results).map(section));
        SlackMessage { text: summary, blocks }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "slack"
    }

    #[tracing::instrument(skip(self, results), fields(notifier = %self.name))]
    async fn notify(
        &self,
        name: &str,
        display_url: &str,
        results: &ResultSet,
    ) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.webhook)
            .timeout(self.timeout)
            .json(&Self::message(name, display_url, results))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if body != "ok" {
            return Err(NotifierError::NotifyFailed(format!(
                "Slack returned {status} with body '{body}'"
            )));
        }
        Ok(())
    }
}
