//! Task coordination (schema §4.6): owns task lifecycle state, dispatches
//! work onto the bus, and ingests worker results idempotently. The
//! relational schema a production deployment would persist this to — DDL,
//! migrations — is out of scope; this crate defines the store traits plus
//! an in-memory implementation that's always available and an optional
//! `sqlx` one behind the `postgres` feature.

mod coordinator;
mod error;
mod memory;
mod store;
mod task;

#[cfg(feature = "postgres")]
mod sql;

pub use coordinator::{Coordinator, NewTask};
pub use error::{Error, Result};
pub use memory::{MemorySchemaStore, MemoryTaskStore};
pub use store::{SchemaStore, TaskFilter, TaskStats, TaskStore};
pub use task::{Task, TaskRun, TaskStatus};

#[cfg(feature = "postgres")]
pub use sql::{PostgresSchemaStore, PostgresTaskStore};
