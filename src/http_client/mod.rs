//! HTTP clients: plain ones for fetching targets, retrying ones for
//! delivering notifications.

mod client;
mod pool;

pub use client::{build_base_client, create_retryable_http_client};
pub use pool::{HttpClientPool, HttpClientPoolError};
