//! Configuration module for sitewatch.

mod app_config;
mod error;
mod helpers;
mod http_retry;
mod loader;
mod monitor_file;

pub use app_config::AppConfig;
pub use error::ConfigurationError;
pub use helpers::{
    deserialize_duration_from_ms, deserialize_duration_from_seconds, format_interval,
    parse_interval, serialize_duration_to_ms, serialize_duration_to_seconds,
};
pub use http_retry::{BaseHttpClientConfig, HttpRetryConfig, JitterSetting};
pub use loader::{ConfigLoader, LoaderError};
pub use monitor_file::{CheckEntry, MonitorDefaults, MonitorEntry, load_monitor_file};
