use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::{FetchError, FetchRequest, FetchedArtifact, Fetcher, RenderError, RenderedPage};

const PAGE_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Loads the target in a remote Chrome reached over the DevTools protocol.
///
/// Each fetch opens its own browser connection and tab. The tab is closed
/// when the returned page is dropped.
#[derive(Debug, Clone)]
pub struct RenderFetcher {
    connect_timeout: Duration,
    load_timeout: Duration,
}

impl RenderFetcher {
    /// Creates a fetcher with the given connect and page load timeouts.
    pub fn new(connect_timeout: Duration, load_timeout: Duration) -> Self {
        Self { connect_timeout, load_timeout }
    }
}

impl Default for RenderFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(3))
    }
}

#[async_trait]
impl Fetcher for RenderFetcher {
    #[tracing::instrument(skip(self, request), fields(url = %request.url))]
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedArtifact, FetchError> {
        let urn = request
            .render_server_urn
            .as_deref()
            .filter(|urn| !urn.is_empty())
            .ok_or_else(|| FetchError::MissingRenderServer(request.url.to_string()))?;

        let (browser, mut handler) = tokio::time::timeout(self.connect_timeout, Browser::connect(urn))
            .await
            .map_err(|_| RenderError::Timeout("connect"))?
            .map_err(|e| RenderError::Connect { urn: urn.to_string(), reason: e.to_string() })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "Browser connection closed.");
                    break;
                }
            }
        });

        // From here on the page owns the connection and cleans it up on drop.
        let mut page = ChromePage { page: None, browser: None, handler: Some(handler) };

        let opened =
            tokio::time::timeout(self.connect_timeout, browser.new_page(request.url.as_str())).await;
        page.browser = Some(browser);
        let opened = opened
            .map_err(|_| RenderError::Timeout("open page"))?
            .map_err(|e| RenderError::Navigation(e.to_string()))?;
        page.page = Some(opened);

        if let Some(opened) = page.page.as_ref() {
            tokio::time::timeout(self.load_timeout, opened.wait_for_navigation())
                .await
                .map_err(|_| RenderError::Timeout("load"))?
                .map_err(|e| RenderError::Navigation(e.to_string()))?;
        }

        tracing::debug!("Rendered target.");
        Ok(FetchedArtifact::Rendered(Box::new(page)))
    }
}

/// A tab in a remote Chrome.
pub struct ChromePage {
    page: Option<Page>,
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
}

impl ChromePage {
    fn page(&self) -> Result<&Page, RenderError> {
        self.page.as_ref().ok_or_else(|| RenderError::Browser("page is closed".to_string()))
    }
}

#[async_trait]
impl RenderedPage for ChromePage {
    async fn html(&self) -> Result<String, RenderError> {
        self.page()?.content().await.map_err(|e| RenderError::Browser(e.to_string()))
    }

    async fn select_text(&self, selector: &str) -> Result<String, RenderError> {
        let element = self
            .page()?
            .find_element(selector)
            .await
            .map_err(|_| RenderError::ElementNotFound(selector.to_string()))?;
        element
            .inner_text()
            .await
            .map_err(|e| RenderError::Browser(e.to_string()))?
            .ok_or_else(|| RenderError::ElementNotFound(selector.to_string()))
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        let page = self.page.take();
        let browser = self.browser.take();
        let Some(handler) = self.handler.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            handler.abort();
            return;
        };
        runtime.spawn(async move {
            if let Some(page) = page {
                if let Err(e) = tokio::time::timeout(PAGE_CLOSE_TIMEOUT, page.close()).await {
                    tracing::debug!(error = %e, "Timed out closing page.");
                }
            }
            // Dropping the connection leaves the remote browser running.
            drop(browser);
            handler.abort();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(urn: Option<&str>) -> FetchRequest {
        FetchRequest {
            url: "https://example.com/".parse().unwrap(),
            headers: Default::default(),
            expected_status_code: 200,
            render_server_urn: urn.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_missing_render_server() {
        let fetcher = RenderFetcher::default();
        for urn in [None, Some("")] {
            let err = fetcher.fetch(&request(urn)).await.unwrap_err();
            assert!(matches!(err, FetchError::MissingRenderServer(_)));
        }
    }

    #[tokio::test]
    async fn test_unreachable_render_server() {
        let fetcher = RenderFetcher::new(Duration::from_millis(500), Duration::from_millis(100));
        let err = fetcher.fetch(&request(Some("ws://127.0.0.1:1/devtools/browser/x"))).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Render(RenderError::Connect { .. } | RenderError::Timeout(_))
        ));
    }
}
