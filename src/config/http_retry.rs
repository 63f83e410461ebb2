//! Outbound HTTP settings shared by every notifier that talks HTTP.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{
    deserialize_duration_from_ms, deserialize_duration_from_seconds, serialize_duration_to_ms,
    serialize_duration_to_seconds,
};

fn default_max_retries() -> u32 {
    2
}

fn default_base_for_backoff() -> u32 {
    2
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(250)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(5)
}

/// Whether retry delays are randomized.
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JitterSetting {
    /// Exact exponential delays.
    None,
    /// Delays drawn uniformly up to the exponential bound.
    #[default]
    Full,
}

/// Retry policy for transient failures when delivering notifications.
///
/// Fetching monitored targets never retries: a failed fetch is a failed run
/// and the schedule takes care of the next attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct HttpRetryConfig {
    /// Maximum number of retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Exponential base for the backoff.
    #[serde(default = "default_base_for_backoff")]
    pub base_for_backoff: u32,

    /// Delay before the first retry.
    #[serde(
        default = "default_initial_backoff",
        deserialize_with = "deserialize_duration_from_ms",
        serialize_with = "serialize_duration_to_ms"
    )]
    pub initial_backoff_ms: Duration,

    /// Upper bound for any single retry delay.
    #[serde(
        default = "default_max_backoff",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub max_backoff_secs: Duration,

    /// Jitter applied to each delay.
    #[serde(default)]
    pub jitter: JitterSetting,
}

impl Default for HttpRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_for_backoff: default_base_for_backoff(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            jitter: JitterSetting::default(),
        }
    }
}

fn default_idle_per_host() -> usize {
    8
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Connection pool settings for the underlying `reqwest` clients.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BaseHttpClientConfig {
    /// Maximum idle connections kept per host.
    #[serde(default = "default_idle_per_host")]
    pub max_idle_per_host: usize,

    /// How long an idle connection is kept.
    #[serde(
        default = "default_idle_timeout",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub idle_timeout: Duration,

    /// Timeout for establishing a connection.
    #[serde(
        default = "default_connect_timeout",
        deserialize_with = "deserialize_duration_from_seconds",
        serialize_with = "serialize_duration_to_seconds"
    )]
    pub connect_timeout: Duration,
}

impl Default for BaseHttpClientConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_idle_per_host(),
            idle_timeout: default_idle_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_defaults_when_empty() {
        let config: HttpRetryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, HttpRetryConfig::default());
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.jitter, JitterSetting::Full);
    }

    #[test]
    fn test_retry_custom_values() {
        let config: HttpRetryConfig = serde_json::from_str(
            r#"{"max_retries": 5, "initial_backoff_ms": 100, "max_backoff_secs": 2, "jitter": "none"}"#,
        )
        .unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_backoff_ms, Duration::from_millis(100));
        assert_eq!(config.max_backoff_secs, Duration::from_secs(2));
        assert_eq!(config.jitter, JitterSetting::None);
    }

    #[test]
    fn test_base_client_partial_values_use_defaults() {
        let config: BaseHttpClientConfig =
            serde_json::from_str(r#"{"max_idle_per_host": 2}"#).unwrap();
        assert_eq!(config.max_idle_per_host, 2);
        assert_eq!(config.idle_timeout, Duration::from_secs(90));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }
}
