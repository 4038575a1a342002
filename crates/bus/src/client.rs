use async_trait::async_trait;
use lapin::options::{BasicConsumeOptions, BasicPublishOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};

use crate::envelope::{ResultEnvelope, TaskEnvelope};
use crate::error::Result;
use crate::topology;

/// The publish half of the bus: typed envelopes in, AMQP bytes out.
/// Consuming is not part of this trait because a `lapin::Consumer` is a
/// stream with its own lifecycle; workers hold an [`AmqpBus`] directly for
/// that, while this trait is what gets mocked in tests and threaded through
/// the coordinator, which only ever publishes.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish_task(&self, envelope: &TaskEnvelope) -> Result<()>;
    async fn publish_result(&self, envelope: &ResultEnvelope) -> Result<()>;
}

/// A connected AMQP client. Holds a single shared channel; `lapin::Channel`
/// is cheaply cloneable and internally serializes frames onto the
/// connection, matching the "single shared channel, serialized publishes"
/// resource model.
pub struct AmqpBus {
    channel: Channel,
}

impl AmqpBus {
    pub async fn connect(amqp_url: &str) -> Result<Self> {
        let connection = Connection::connect(
            amqp_url,
            ConnectionProperties::default()
                .with_executor(tokio_executor_trait::Tokio::current())
                .with_reactor(tokio_reactor_trait::Tokio),
        )
        .await?;

        let channel = connection.create_channel().await?;
        topology::declare(&channel).await?;

        tracing::info!("connected to message bus and declared topology");

        Ok(Self { channel })
    }

    /// Subscribes to `queue` with the given prefetch (schema §4.5: 10 for
    /// HTTP, 2 for browser).
    pub async fn consume(&self, queue: &str, consumer_tag: &str, prefetch: u16) -> Result<Consumer> {
        self.channel
            .basic_qos(prefetch, lapin::options::BasicQosOptions::default())
            .await?;

        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(consumer)
    }

    async fn publish(&self, routing_key: &str, priority: u8, payload: &[u8]) -> Result<()> {
        self.channel
            .basic_publish(
                topology::EXCHANGE_DIRECT,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2) // persistent
                    .with_priority(priority),
            )
            .await?
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Bus for AmqpBus {
    async fn publish_task(&self, envelope: &TaskEnvelope) -> Result<()> {
        let payload = serde_json::to_vec(envelope)?;
        self.publish(envelope.routing_key(), envelope.priority, &payload).await
    }

    async fn publish_result(&self, envelope: &ResultEnvelope) -> Result<()> {
        let payload = serde_json::to_vec(envelope)?;
        self.publish(topology::ROUTING_RESULT, 0, &payload).await
    }
}
