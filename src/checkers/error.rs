use thiserror::Error;

/// Problems hit while evaluating a checker against a document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckerError {
    /// The body is not valid JSON.
    #[error("Failed to parse JSON document: {0}")]
    InvalidJson(String),

    /// The XPath expression failed while evaluating.
    #[error("XPath evaluation failed: {0}")]
    XPath(String),

    /// The selector matched nothing on the page.
    #[error("No element matches selector '{0}'")]
    ElementNotFound(String),

    /// The rendering backend failed.
    #[error("Render backend error: {0}")]
    Render(String),
}
