//! The worker: claims task messages, runs the fetch/extract/write pipeline
//! against a schema, and reports results back onto the bus (schema §4.5).

mod config;
mod error;
mod pagination;
mod pipeline;
mod schema_cache;
mod service;
mod source;

pub use config::WorkerSettings;
pub use error::{Error, Result};
pub use pagination::derive_next_page;
pub use pipeline::{process, Outcome};
pub use schema_cache::SchemaCache;
pub use service::{Worker, WorkerConfig};
pub use source::{Ack, AmqpTaskSource, MockTaskSource, PendingTask, TaskSource};
