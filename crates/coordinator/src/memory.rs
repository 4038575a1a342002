//! In-memory `TaskStore`/`SchemaStore` implementations (schema §4.6,
//! supplemented): always available, no external services required.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schema::ParsingSchema;
use uuid::Uuid;

use crate::error::Result;
use crate::store::{SchemaStore, TaskFilter, TaskStats, TaskStore};
use crate::task::{Task, TaskRun, TaskStatus};

/// In-memory storage for tasks and runs. Useful for tests and for running
/// the coordinator without a database; data does not survive a restart.
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<Uuid, Task>>,
    runs: RwLock<HashMap<Uuid, TaskRun>>,
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            runs: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, task: Task) -> Result<Task> {
        self.tasks.write().unwrap().insert(task.task_id, task.clone());
        Ok(task)
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<Task>> {
        Ok(self.tasks.read().unwrap().get(&task_id).cloned())
    }

    async fn update(&self, task: Task) -> Result<()> {
        self.tasks.write().unwrap().insert(task.task_id, task);
        Ok(())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let tasks = self.tasks.read().unwrap();
        Ok(tasks
            .values()
            .filter(|t| filter.source_id.as_deref().is_none_or(|s| s == t.source_id))
            .filter(|t| filter.status.is_none_or(|s| s == t.status))
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<TaskStats> {
        let tasks = self.tasks.read().unwrap();
        let mut stats = TaskStats::default();
        for task in tasks.values() {
            *stats.by_status.entry(format!("{:?}", task.status)).or_insert(0) += 1;
            *stats.by_source.entry(task.source_id.clone()).or_insert(0) += 1;
            *stats.by_day.entry(task.created_at.format("%Y-%m-%d").to_string()).or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn record_run(&self, run: TaskRun) -> Result<()> {
        self.runs.write().unwrap().insert(run.run_id, run);
        Ok(())
    }

    async fn run_exists(&self, run_id: Uuid) -> Result<bool> {
        Ok(self.runs.read().unwrap().contains_key(&run_id))
    }

    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        let tasks = self.tasks.read().unwrap();
        Ok(tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| t.scheduled_at.is_some_and(|at| at <= now))
            .cloned()
            .collect())
    }
}

/// In-memory `ParsingSchema` storage, keyed by `(schema_id, version)` with a
/// side index tracking each schema's highest known version.
pub struct MemorySchemaStore {
    schemas: RwLock<HashMap<(Uuid, u32), ParsingSchema>>,
    latest: RwLock<HashMap<Uuid, u32>>,
}

impl Default for MemorySchemaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
            latest: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SchemaStore for MemorySchemaStore {
    async fn get(&self, schema_id: Uuid, version: Option<u32>) -> Result<Option<ParsingSchema>> {
        let version = match version {
            Some(v) => v,
            None => match self.latest.read().unwrap().get(&schema_id) {
                Some(v) => *v,
                None => return Ok(None),
            },
        };
        Ok(self.schemas.read().unwrap().get(&(schema_id, version)).cloned())
    }

    async fn put(&self, schema: ParsingSchema) -> Result<()> {
        let mut latest = self.latest.write().unwrap();
        let entry = latest.entry(schema.schema_id).or_insert(schema.version);
        if schema.version > *entry {
            *entry = schema.version;
        }
        self.schemas
            .write()
            .unwrap()
            .insert((schema.schema_id, schema.version), schema);
        Ok(())
    }

    async fn latest_version(&self, schema_id: Uuid) -> Result<Option<u32>> {
        Ok(self.latest.read().unwrap().get(&schema_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bus::{FetchMode, SchemaVersion};

    fn sample_task() -> Task {
        Task::new(
            "demo-source",
            "https://example.com",
            Uuid::new_v4(),
            SchemaVersion::Pinned(1),
            FetchMode::Http,
            5,
            3,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let store = MemoryTaskStore::new();
        let task = store.create(sample_task()).await.unwrap();
        let fetched = store.get(task.task_id).await.unwrap().unwrap();
        assert_eq!(fetched.task_id, task.task_id);
    }

    #[tokio::test]
    async fn run_exists_is_idempotency_check() {
        let store = MemoryTaskStore::new();
        let task = sample_task();
        let run_id = Uuid::new_v4();
        assert!(!store.run_exists(run_id).await.unwrap());

        let run = TaskRun {
            task_id: task.task_id,
            run_id,
            attempt: 1,
            http_status: Some(200),
            duration_ms: 10,
            bytes_downloaded: 100,
            requests_count: 1,
            pages_processed: 1,
            records_extracted: 5,
            records_valid: 5,
            records_rejected: 0,
            pointers: Default::default(),
            errors: Vec::new(),
            worker_id: "worker-1".into(),
            status: TaskStatus::Success,
            started_at: Utc::now(),
            completed_at: Utc::now(),
        };
        store.record_run(run).await.unwrap();
        assert!(store.run_exists(run_id).await.unwrap());
    }

    #[tokio::test]
    async fn schema_store_tracks_latest_version() {
        let store = MemorySchemaStore::new();
        let schema_id = Uuid::new_v4();
        let v1 = ParsingSchema::new(
            schema_id,
            1,
            "demo-source",
            "https://example.com",
            vec![schema::FieldDefinition::new(
                "name",
                schema::FieldType::String,
                schema::ExtractionMethod::Css,
                ".name",
            )],
            schema::FetchMode::Http,
        );
        let mut v2 = v1.clone();
        v2.version = 2;

        store.put(v1).await.unwrap();
        store.put(v2).await.unwrap();

        assert_eq!(store.latest_version(schema_id).await.unwrap(), Some(2));
        assert!(store.get(schema_id, Some(1)).await.unwrap().is_some());
        assert_eq!(store.get(schema_id, None).await.unwrap().unwrap().version, 2);
    }
}
