use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::fetch::{FetchError, FetchRequest, FetchedArtifact, Fetcher};

/// A fetcher answering every request with the same body or the same error.
#[derive(Debug, Clone)]
pub struct StaticFetcher {
    response: Result<Bytes, FetchError>,
    calls: Arc<AtomicUsize>,
}

impl StaticFetcher {
    /// Always returns `body` as a static document.
    pub fn body(body: &str) -> Self {
        Self { response: Ok(Bytes::copy_from_slice(body.as_bytes())), calls: Arc::default() }
    }

    /// Always fails with `error`.
    pub fn error(error: FetchError) -> Self {
        Self { response: Err(error), calls: Arc::default() }
    }

    /// Number of fetches so far, shared between clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, _request: &FetchRequest) -> Result<FetchedArtifact, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone().map(FetchedArtifact::Static)
    }
}
