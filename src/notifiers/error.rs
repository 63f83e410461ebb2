//! Errors raised while delivering a notification.

use thiserror::Error;

use crate::persistence::PersistenceError;

/// A failed delivery. The caller logs it and moves on to the next notifier.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// The sink answered but did not accept the alert.
    #[error("Notification failed: {0}")]
    NotifyFailed(String),

    /// The sink's reply could not be understood.
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    /// A payload or header could not be built.
    #[error("Failed to build request: {0}")]
    InvalidRequest(String),

    /// The HTTP request failed, after retries.
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest_middleware::Error),

    /// Writing the alert to the store failed.
    #[error("Store error: {0}")]
    Store(#[from] PersistenceError),
}

impl From<reqwest::Error> for NotifierError {
    fn from(e: reqwest::Error) -> Self {
        NotifierError::RequestError(reqwest_middleware::Error::Reqwest(e))
    }
}
