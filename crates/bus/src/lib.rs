//! The AMQP message bus client (schema §4.9): typed task/result envelopes,
//! idempotent topology declaration, and a publish trait that is mocked in
//! tests rather than talking to a broker.

mod client;
mod envelope;
mod error;
mod mock;
mod topology;

pub use client::{AmqpBus, Bus};
pub use envelope::{
    ErrorCode, ErrorEntry, ExtractionStats, FetchMode, LatestTag, Metrics, Pointers, ResultEnvelope,
    RunStatus, SchemaVersion, TaskEnvelope,
};
pub use error::{Error, Result};
pub use mock::MockBus;
pub use topology::{
    EXCHANGE_DIRECT, EXCHANGE_DLQ, QUEUE_DLQ_TASKS, QUEUE_RESULTS, QUEUE_TASKS_BROWSER, QUEUE_TASKS_HTTP,
    ROUTING_DLQ_TASKS, ROUTING_RESULT, ROUTING_TASK_BROWSER, ROUTING_TASK_HTTP,
};

pub use lapin::Consumer;
