//! RabbitMQ broker over AMQP 0.9.1.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    BasicProperties, Connection, ConnectionProperties,
    acker::Acker,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ConfirmSelectOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};

use super::{Acknowledge, Channel, Delivery, DeliveryStream, MessageBroker, QueueError};

/// AMQP delivery mode of messages that survive a broker restart.
const PERSISTENT: u8 = 2;

/// A RabbitMQ broker with durable queues and publisher confirms.
pub struct RabbitMqBroker {
    connection: Connection,

    /// The channel used for publishing, in confirm mode.
    publisher: lapin::Channel,
}

impl RabbitMqBroker {
    /// Connects to `uri` and declares both pipeline queues.
    #[tracing::instrument(skip(uri), level = "info")]
    pub async fn connect(uri: &str) -> Result<Self, QueueError> {
        let connection = Connection::connect(uri, ConnectionProperties::default()).await?;
        let publisher = connection.create_channel().await?;
        publisher.confirm_select(ConfirmSelectOptions::default()).await?;
        for channel in Channel::ALL {
            declare(&publisher, channel).await?;
        }
        tracing::info!("Connected to RabbitMQ.");
        Ok(Self { connection, publisher })
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), QueueError> {
        self.connection.close(200, "shutdown").await?;
        Ok(())
    }
}

async fn declare(amqp: &lapin::Channel, channel: Channel) -> Result<(), QueueError> {
    amqp.queue_declare(
        channel.as_str(),
        QueueDeclareOptions { durable: true, ..Default::default() },
        FieldTable::default(),
    )
    .await?;
    Ok(())
}

struct AmqpAcker(Acker);

#[async_trait]
impl Acknowledge for AmqpAcker {
    async fn ack(&self) -> Result<(), QueueError> {
        self.0.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn reject(&self) -> Result<(), QueueError> {
        self.0.reject(BasicRejectOptions { requeue: false }).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for RabbitMqBroker {
    async fn publish(&self, channel: Channel, payload: &[u8]) -> Result<(), QueueError> {
        let confirmation = self
            .publisher
            .basic_publish(
                "",
                channel.as_str(),
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(PERSISTENT),
            )
            .await? // Wait for the publish
            .await?; // Wait for the confirmation
        if confirmation.is_nack() {
            return Err(QueueError::Nacked(channel));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "info")]
    async fn subscribe(
        &self,
        channel: Channel,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, QueueError> {
        let amqp = self.connection.create_channel().await?;
        amqp.basic_qos(1, BasicQosOptions::default()).await?;
        declare(&amqp, channel).await?;
        let consumer = amqp
            .basic_consume(
                channel.as_str(),
                consumer_tag,
                BasicConsumeOptions { no_ack: false, ..Default::default() },
                FieldTable::default(),
            )
            .await?;
        tracing::info!(%channel, consumer_tag, "Consuming from RabbitMQ.");

        let stream = consumer.map(move |delivery| {
            // The consuming channel lives as long as its stream.
            let _ = &amqp;
            let delivery = delivery?;
            Ok(Delivery::new(delivery.data, Box::new(AmqpAcker(delivery.acker))))
        });
        Ok(stream.boxed())
    }
}
