//! Retrieval of monitored targets.
//!
//! A [`Fetcher`] turns a [`FetchRequest`] into a [`FetchedArtifact`]: either
//! the raw body of a plain GET or a live page in a remote browser. The
//! [`FetcherSet`] picks the fetcher for a monitor's kind.

mod error;
mod http;
mod render;

use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use url::Url;

pub use error::{FetchError, RenderError};
pub use http::HttpFetcher;
pub use render::{ChromePage, RenderFetcher};

use crate::{
    checkers::Document,
    config::AppConfig,
    models::{MonitorDefinition, MonitorKind},
};

/// A page loaded in a remote browser.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RenderedPage: Send + Sync {
    /// The serialized DOM.
    async fn html(&self) -> Result<String, RenderError>;

    /// The visible text of the first element matching a CSS selector.
    async fn select_text(&self, selector: &str) -> Result<String, RenderError>;
}

/// What to fetch and how to judge the response.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Target URL.
    pub url: Url,
    /// Request headers, including the defaulted Referer.
    pub headers: BTreeMap<String, String>,
    /// The only acceptable status for plain fetches.
    pub expected_status_code: u16,
    /// Browser endpoint for rendered fetches.
    pub render_server_urn: Option<String>,
}

impl FetchRequest {
    /// Builds the request a monitor definition describes.
    pub fn from_definition(def: &MonitorDefinition) -> Self {
        Self {
            url: def.url.clone(),
            headers: def.request_headers(),
            expected_status_code: def.expected_status_code,
            render_server_urn: def.render_server_urn.clone(),
        }
    }
}

/// A fetched target, ready for checkers.
pub enum FetchedArtifact {
    /// The body of a plain fetch.
    Static(Bytes),
    /// A page held open in a remote browser.
    Rendered(Box<dyn RenderedPage>),
}

impl FetchedArtifact {
    /// Borrows the artifact as a checker document.
    pub fn as_document(&self) -> Document<'_> {
        match self {
            FetchedArtifact::Static(body) => Document::Static(body),
            FetchedArtifact::Rendered(page) => Document::Rendered(page.as_ref()),
        }
    }
}

impl fmt::Debug for FetchedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchedArtifact::Static(body) => write!(f, "Static({} bytes)", body.len()),
            FetchedArtifact::Rendered(_) => f.write_str("Rendered"),
        }
    }
}

/// Retrieves a target.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the target of `request`.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedArtifact, FetchError>;
}

/// One fetcher per monitor kind.
#[derive(Clone)]
pub struct FetcherSet {
    http: Arc<dyn Fetcher>,
    render: Arc<dyn Fetcher>,
}

impl FetcherSet {
    /// Creates a set from explicit fetchers.
    pub fn new(http: Arc<dyn Fetcher>, render: Arc<dyn Fetcher>) -> Self {
        Self { http, render }
    }

    /// The plain HTTP and rendered-page fetchers with the configured
    /// timeouts.
    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let http = HttpFetcher::from_config(&config.http_base_config, config.fetch_timeout_secs)?;
        let render =
            RenderFetcher::new(config.render_connect_timeout_secs, config.render_load_timeout_secs);
        Ok(Self::new(Arc::new(http), Arc::new(render)))
    }

    /// Uses the same fetcher for every kind.
    pub fn uniform(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { http: fetcher.clone(), render: fetcher }
    }

    /// The fetcher for `kind`.
    pub fn for_kind(&self, kind: MonitorKind) -> &Arc<dyn Fetcher> {
        match kind {
            MonitorKind::Http => &self.http,
            MonitorKind::HttpRender => &self.render,
        }
    }
}

impl fmt::Debug for FetcherSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetcherSet").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MonitorDefinitionBuilder;

    #[test]
    fn test_request_from_definition() {
        let def = MonitorDefinitionBuilder::new("shop")
            .url("https://api.example.com/p/1")
            .display_url("https://www.example.com/p/1")
            .header("Accept", "application/json")
            .expected_status_code(203)
            .build();

        let request = FetchRequest::from_definition(&def);

        assert_eq!(request.url.as_str(), "https://api.example.com/p/1");
        assert_eq!(request.expected_status_code, 203);
        assert_eq!(request.headers.get("Referer").unwrap(), "https://www.example.com/");
        assert_eq!(request.headers.get("Accept").unwrap(), "application/json");
    }

    #[tokio::test]
    async fn test_fetcher_set_selects_by_kind() {
        let mut http = MockFetcher::new();
        http.expect_fetch()
            .times(1)
            .returning(|_| Ok(FetchedArtifact::Static(Bytes::from_static(b"plain"))));
        let mut render = MockFetcher::new();
        render
            .expect_fetch()
            .times(1)
            .returning(|_| Err(FetchError::MissingRenderServer("x".into())));

        let set = FetcherSet::new(Arc::new(http), Arc::new(render));
        let request = FetchRequest::from_definition(&MonitorDefinitionBuilder::new("m").build());

        assert!(set.for_kind(MonitorKind::Http).fetch(&request).await.is_ok());
        assert!(set.for_kind(MonitorKind::HttpRender).fetch(&request).await.is_err());
    }
}
