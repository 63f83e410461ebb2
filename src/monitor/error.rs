use thiserror::Error;

use crate::fetch::FetchError;

/// A run that ended before its checks were evaluated.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The target could not be fetched or answered with the wrong status.
    #[error("Fetch failed for monitor '{monitor}': {source}")]
    Fetch {
        /// The monitor name.
        monitor: String,
        /// The underlying error.
        #[source]
        source: FetchError,
    },
}
