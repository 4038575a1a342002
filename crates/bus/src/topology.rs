//! The AMQP wire topology (schema §4.9/§6): two direct exchanges, four
//! queues, and the bindings between them. Declaration is idempotent —
//! `queue_declare`/`exchange_declare`/`queue_bind` with matching arguments
//! are safe to repeat on every connect, so every worker process declares
//! the full topology at startup rather than assuming an operator did it.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, LongLongInt, ShortString};
use lapin::{Channel, ExchangeKind};

use crate::error::Result;

pub const EXCHANGE_DIRECT: &str = "parser.direct";
pub const EXCHANGE_DLQ: &str = "parser.dlq";

pub const QUEUE_TASKS_HTTP: &str = "tasks.http";
pub const QUEUE_TASKS_BROWSER: &str = "tasks.browser";
pub const QUEUE_RESULTS: &str = "results";
pub const QUEUE_DLQ_TASKS: &str = "dlq.tasks";

pub const ROUTING_TASK_HTTP: &str = "task.http";
pub const ROUTING_TASK_BROWSER: &str = "task.browser";
pub const ROUTING_RESULT: &str = "result";
pub const ROUTING_DLQ_TASKS: &str = "dlq.tasks";

const DLQ_TTL_MS: LongLongInt = 7 * 24 * 60 * 60 * 1000;
const MAX_PRIORITY: u8 = 10;

/// Declares every exchange, queue, and binding this system depends on.
/// Safe to call on every connection establishment.
pub async fn declare(channel: &Channel) -> Result<()> {
    channel
        .exchange_declare(
            EXCHANGE_DIRECT,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .exchange_declare(
            EXCHANGE_DLQ,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    for (queue, routing_key) in [
        (QUEUE_TASKS_HTTP, ROUTING_TASK_HTTP),
        (QUEUE_TASKS_BROWSER, ROUTING_TASK_BROWSER),
    ] {
        let mut args = FieldTable::default();
        args.insert(
            ShortString::from("x-max-priority"),
            AMQPValue::ShortShortUInt(MAX_PRIORITY),
        );
        args.insert(
            ShortString::from("x-dead-letter-exchange"),
            AMQPValue::LongString(EXCHANGE_DLQ.into()),
        );
        args.insert(
            ShortString::from("x-dead-letter-routing-key"),
            AMQPValue::LongString(ROUTING_DLQ_TASKS.into()),
        );

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                args,
            )
            .await?;

        channel
            .queue_bind(
                queue,
                EXCHANGE_DIRECT,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
    }

    channel
        .queue_declare(
            QUEUE_RESULTS,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            QUEUE_RESULTS,
            EXCHANGE_DIRECT,
            ROUTING_RESULT,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    let mut dlq_args = FieldTable::default();
    dlq_args.insert(
        ShortString::from("x-message-ttl"),
        AMQPValue::LongLongInt(DLQ_TTL_MS),
    );
    channel
        .queue_declare(
            QUEUE_DLQ_TASKS,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            dlq_args,
        )
        .await?;
    channel
        .queue_bind(
            QUEUE_DLQ_TASKS,
            EXCHANGE_DLQ,
            ROUTING_DLQ_TASKS,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    Ok(())
}
