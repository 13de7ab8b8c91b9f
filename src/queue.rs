//! Queue Module
//!
//! Mail source seam for the pipeline. `dequeue` returns `None` when the queue
//! is empty (a normal condition, never an error) and `wait` blocks until a
//! message is plausibly available. The production implementation consumes an
//! AMQP queue: messages are acked at dequeue time, so a message that later
//! fails a pipeline stage is dropped, never redelivered.

use crate::error::{PipelineError, Result};
use crate::models::Mail;
use async_trait::async_trait;
use lapin::options::{BasicAckOptions, BasicGetOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Connection, ConnectionProperties};
use std::time::Duration;

#[async_trait]
pub trait MailQueue: Send {
    /// Takes the next message off the queue, or `None` when it is empty.
    async fn dequeue(&mut self) -> Result<Option<Mail>>;

    /// Blocks until a message is plausibly available.
    async fn wait(&mut self);

    /// Releases the queue handle. Only reached on shutdown paths.
    async fn close(&mut self) -> Result<()>;
}

pub struct AmqpQueue {
    channel: Channel,
    queue: String,
    poll_interval: Duration,
}

impl AmqpQueue {
    /// Connects to the broker and declares the queue, with `capacity` applied
    /// as its maximum length.
    pub async fn open(
        addr: &str,
        queue: &str,
        capacity: u32,
        poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        let conn = Connection::connect(addr, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;

        let mut args = FieldTable::default();
        args.insert("x-max-length".into(), AMQPValue::LongInt(capacity as i32));
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                args,
            )
            .await?;

        Ok(Self {
            channel,
            queue: queue.to_string(),
            poll_interval,
        })
    }
}

#[async_trait]
impl MailQueue for AmqpQueue {
    async fn dequeue(&mut self) -> Result<Option<Mail>> {
        let message = self
            .channel
            .basic_get(&self.queue, BasicGetOptions::default())
            .await
            .map_err(|e| PipelineError::Queue(e.to_string()))?;

        match message {
            None => Ok(None),
            Some(message) => {
                // ack before processing: at-most-once, failures drop the message
                message
                    .delivery
                    .ack(BasicAckOptions::default())
                    .await
                    .map_err(|e| PipelineError::Queue(e.to_string()))?;
                let mail = serde_json::from_slice(&message.delivery.data)
                    .map_err(|e| PipelineError::DecodeError(format!("queue payload: {}", e)))?;
                Ok(Some(mail))
            }
        }
    }

    async fn wait(&mut self) {
        tokio::time::sleep(self.poll_interval).await;
    }

    async fn close(&mut self) -> Result<()> {
        self.channel
            .close(200, "shutting down")
            .await
            .map_err(|e| PipelineError::Queue(e.to_string()))
    }
}
