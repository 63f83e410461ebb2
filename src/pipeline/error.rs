use thiserror::Error;

use crate::{persistence::PersistenceError, queue::QueueError};

/// Errors that stop a pipeline role.
///
/// Problems confined to one job or one notifier are logged by the roles and
/// never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The broker could not be reached or refused an operation.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// The monitor store could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// A message could not be encoded.
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}
