use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schema::ParsingSchema;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::task::{Task, TaskRun, TaskStatus};

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub source_id: Option<String>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStats {
    pub by_status: HashMap<String, u64>,
    pub by_source: HashMap<String, u64>,
    pub by_day: HashMap<String, u64>,
}

/// Persistence surface for task state (schema §4.6). The relational schema
/// behind a real implementation — DDL, migrations — is out of scope here;
/// this trait plus the in-memory/`sqlx` implementations of it are what this
/// crate owns.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: Task) -> Result<Task>;
    async fn get(&self, task_id: Uuid) -> Result<Option<Task>>;
    async fn update(&self, task: Task) -> Result<()>;
    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>>;
    async fn stats(&self) -> Result<TaskStats>;

    async fn record_run(&self, run: TaskRun) -> Result<()>;
    /// Idempotency check for result ingestion (schema §4.6): has this
    /// `run_id` already been recorded?
    async fn run_exists(&self, run_id: Uuid) -> Result<bool>;

    /// Tasks with `scheduled_at` now due, still `PENDING`.
    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Task>>;
}

/// Persistence surface for parsing schemas, read-mostly from the worker's
/// perspective (schema §4.7's cache sits in front of this).
#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn get(&self, schema_id: Uuid, version: Option<u32>) -> Result<Option<ParsingSchema>>;
    async fn put(&self, schema: ParsingSchema) -> Result<()>;
    async fn latest_version(&self, schema_id: Uuid) -> Result<Option<u32>>;
}
