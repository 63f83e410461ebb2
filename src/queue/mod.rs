//! Durable at-least-once transport between the pipeline roles.
//!
//! Two channels connect the roles: the scheduler publishes jobs to
//! [`Channel::Schedule`], workers publish results to
//! [`Channel::Notifications`]. Consumers acknowledge each [`Delivery`]
//! explicitly. Rejected deliveries are dropped, never requeued.

pub mod error;
pub mod memory;
pub mod rabbitmq;

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;

pub use error::QueueError;
pub use memory::InMemoryBroker;
pub use rabbitmq::RabbitMqBroker;

/// A named queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Jobs for workers.
    Schedule,
    /// Results for the notifier role.
    Notifications,
}

impl Channel {
    /// Every channel, in declaration order.
    pub const ALL: [Channel; 2] = [Channel::Schedule, Channel::Notifications];

    /// The queue name on the broker.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Schedule => "schedule",
            Channel::Notifications => "notifications",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settles a delivery with the broker it came from.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// Confirms the delivery was processed.
    async fn ack(&self) -> Result<(), QueueError>;

    /// Drops the delivery without requeueing it.
    async fn reject(&self) -> Result<(), QueueError>;
}

/// One received message, settled exactly once through [`Delivery::ack`] or
/// [`Delivery::reject`].
pub struct Delivery {
    payload: Vec<u8>,
    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    /// Wraps a received payload with the handle that settles it.
    pub fn new(payload: Vec<u8>, acker: Box<dyn Acknowledge>) -> Self {
        Self { payload, acker }
    }

    /// The message body.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Acknowledges the delivery.
    pub async fn ack(self) -> Result<(), QueueError> {
        self.acker.ack().await
    }

    /// Drops the delivery without requeueing it.
    pub async fn reject(self) -> Result<(), QueueError> {
        self.acker.reject().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery").field("payload_len", &self.payload.len()).finish()
    }
}

/// The deliveries of one subscription.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, QueueError>>;

/// A message broker with the two pipeline channels.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publishes `payload` and waits until the broker has accepted it.
    async fn publish(&self, channel: Channel, payload: &[u8]) -> Result<(), QueueError>;

    /// Starts consuming `channel`. Each consumer has at most one unsettled
    /// delivery at a time on brokers that support prefetch limits.
    async fn subscribe(
        &self,
        channel: Channel,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivery_settles_through_acker() {
        let mut acker = MockAcknowledge::new();
        acker.expect_ack().times(1).returning(|| Ok(()));
        acker.expect_reject().never();

        let delivery = Delivery::new(b"{}".to_vec(), Box::new(acker));
        assert_eq!(delivery.payload(), b"{}");
        delivery.ack().await.unwrap();
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(
            Channel::ALL.map(|c| c.to_string()),
            ["schedule".to_string(), "notifications".to_string()]
        );
    }
}
