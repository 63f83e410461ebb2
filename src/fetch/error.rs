use thiserror::Error;

/// Problems talking to the remote browser.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The browser endpoint could not be reached.
    #[error("Failed to connect to render server '{urn}': {reason}")]
    Connect {
        /// The endpoint.
        urn: String,
        /// Connection message.
        reason: String,
    },

    /// Opening the page or waiting for it to load failed.
    #[error("Failed to load page: {0}")]
    Navigation(String),

    /// A step did not finish in time.
    #[error("Render step '{0}' timed out")]
    Timeout(&'static str),

    /// No element matches the selector.
    #[error("No element matches selector '{0}'")]
    ElementNotFound(String),

    /// Any other protocol error.
    #[error("Browser error: {0}")]
    Browser(String),
}

/// A fetch failure. Any of these aborts the run before checks are evaluated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request failed or timed out.
    #[error("Request to {url} failed: {reason}")]
    Request {
        /// The target.
        url: String,
        /// Transport message.
        reason: String,
    },

    /// The response status differs from the configured one.
    #[error("Unexpected status code {actual} from {url}, expected {expected}")]
    UnexpectedStatus {
        /// The target.
        url: String,
        /// Configured status.
        expected: u16,
        /// Received status.
        actual: u16,
    },

    /// A configured header is not a valid HTTP header.
    #[error("Invalid header '{0}'")]
    InvalidHeader(String),

    /// A rendered fetch was requested without a browser endpoint.
    #[error("No render server configured for {0}")]
    MissingRenderServer(String),

    /// The remote browser failed.
    #[error(transparent)]
    Render(#[from] RenderError),
}
