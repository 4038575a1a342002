//! Abstracts "where a task message comes from" (schema §4.5/§4.9), the same
//! way the job-worker pattern this is grounded on abstracts "where a claimed
//! job comes from" behind `JobStore`. The AMQP implementation wraps a
//! `lapin::Consumer`; tests use an in-memory queue instead.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bus::TaskEnvelope;
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions};
use lapin::Consumer;
use tracing::warn;

use crate::error::Result;

/// The outcome a worker reports back to the source once a task message has
/// been fully processed (or found malformed).
#[async_trait]
pub trait Ack: Send + Sync {
    /// The task completed; remove the message from the queue.
    async fn ack(&self) -> Result<()>;
    /// A transient failure; redeliver the message so another worker (or
    /// this one) can retry it.
    async fn requeue(&self) -> Result<()>;
    /// A permanent failure; reject without requeue so the broker routes it
    /// to the dead-letter exchange (schema §4.9/§6).
    async fn dead_letter(&self) -> Result<()>;
}

pub struct PendingTask {
    pub envelope: TaskEnvelope,
    pub ack: Box<dyn Ack>,
}

#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Returns the next task message, or `None` when the source is
    /// exhausted (consumer cancelled, channel closed).
    async fn recv(&self) -> Result<Option<PendingTask>>;
}

struct DeliveryAck(lapin::message::Delivery);

#[async_trait]
impl Ack for DeliveryAck {
    async fn ack(&self) -> Result<()> {
        self.0.ack(BasicAckOptions::default()).await.map_err(bus::Error::Amqp)?;
        Ok(())
    }

    async fn requeue(&self) -> Result<()> {
        self.0
            .nack(BasicNackOptions { multiple: false, requeue: true })
            .await
            .map_err(bus::Error::Amqp)?;
        Ok(())
    }

    async fn dead_letter(&self) -> Result<()> {
        self.0
            .reject(BasicRejectOptions { requeue: false })
            .await
            .map_err(bus::Error::Amqp)?;
        Ok(())
    }
}

/// A `TaskSource` backed by a live `lapin::Consumer`. Malformed message
/// bodies are dead-lettered immediately with a `VALIDATION_ERROR`-flavored
/// log rather than surfaced to the caller as a task (schema §4.5 step 1).
pub struct AmqpTaskSource {
    consumer: Mutex<Consumer>,
}

impl AmqpTaskSource {
    pub fn new(consumer: Consumer) -> Self {
        Self { consumer: Mutex::new(consumer) }
    }
}

#[async_trait]
impl TaskSource for AmqpTaskSource {
    async fn recv(&self) -> Result<Option<PendingTask>> {
        loop {
            let next = {
                let mut consumer = self.consumer.lock().unwrap();
                consumer.next().await
            };

            let Some(delivery) = next else {
                return Ok(None);
            };
            let delivery = delivery.map_err(bus::Error::Amqp)?;

            match serde_json::from_slice::<TaskEnvelope>(&delivery.data) {
                Ok(envelope) => {
                    return Ok(Some(PendingTask { envelope, ack: Box::new(DeliveryAck(delivery)) }));
                }
                Err(err) => {
                    warn!(error = %err, "malformed task message, dead-lettering");
                    DeliveryAck(delivery).dead_letter().await?;
                    continue;
                }
            }
        }
    }
}

/// An in-memory `TaskSource` for tests: pre-loaded envelopes, acks recorded
/// rather than sent anywhere.
pub struct MockTaskSource {
    queue: Mutex<VecDeque<TaskEnvelope>>,
}

impl MockTaskSource {
    pub fn new(envelopes: Vec<TaskEnvelope>) -> Self {
        Self { queue: Mutex::new(envelopes.into()) }
    }
}

struct NoopAck;

#[async_trait]
impl Ack for NoopAck {
    async fn ack(&self) -> Result<()> {
        Ok(())
    }

    async fn requeue(&self) -> Result<()> {
        Ok(())
    }

    async fn dead_letter(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl TaskSource for MockTaskSource {
    async fn recv(&self) -> Result<Option<PendingTask>> {
        let envelope = self.queue.lock().unwrap().pop_front();
        Ok(envelope.map(|envelope| PendingTask { envelope, ack: Box::new(NoopAck) }))
    }
}
