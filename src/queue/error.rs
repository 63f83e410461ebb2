//! Broker errors.

use thiserror::Error;

use super::Channel;

/// Errors raised by message brokers.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The AMQP client failed.
    #[error("RabbitMQ error: {0}")]
    Lapin(#[from] lapin::Error),

    /// The broker refused a published message.
    #[error("Broker rejected a message published to '{0}'")]
    Nacked(Channel),

    /// The broker has been closed.
    #[error("Channel '{0}' is closed")]
    Closed(Channel),
}
