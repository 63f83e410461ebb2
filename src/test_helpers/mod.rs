//! A set of helpers for testing

mod fetcher;
mod http_client;
mod monitor;
mod notifier;

pub use fetcher::StaticFetcher;
pub use http_client::{create_test_factory, create_test_http_client};
pub use monitor::MonitorDefinitionBuilder;
pub use notifier::CountingNotifier;
