//! Task coordinator operations (schema §4.6): the only writer of
//! authoritative task state. Workers observe this state only through the
//! immutable copy embedded in a task message; they never call back into it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as Json;
use tracing::{info, warn};
use uuid::Uuid;

use bus::{Bus, FetchMode, Pointers, ResultEnvelope, RunStatus, SchemaVersion, TaskEnvelope};

use crate::error::{Error, Result};
use crate::store::{SchemaStore, TaskFilter, TaskStats, TaskStore};
use crate::task::{Task, TaskRun, TaskStatus};

/// Input for creating a new task; mirrors the subset of [`Task`] a caller
/// actually chooses at creation time.
pub struct NewTask {
    pub source_id: String,
    pub target_url: String,
    pub schema_id: Uuid,
    pub schema_version: SchemaVersion,
    pub mode: FetchMode,
    pub priority: u8,
    pub max_attempts: u32,
    pub timeout_seconds: u64,
    pub ttl_seconds: u64,
    pub context: HashMap<String, Json>,
    pub cookies: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub proxy_profile_id: Option<String>,
    pub session_profile_id: Option<String>,
    pub scheduled_at: Option<chrono::DateTime<Utc>>,
}

pub struct Coordinator {
    tasks: Arc<dyn TaskStore>,
    schemas: Arc<dyn SchemaStore>,
    bus: Arc<dyn Bus>,
}

impl Coordinator {
    pub fn new(tasks: Arc<dyn TaskStore>, schemas: Arc<dyn SchemaStore>, bus: Arc<dyn Bus>) -> Self {
        Self { tasks, schemas, bus }
    }

    pub fn schemas(&self) -> &Arc<dyn SchemaStore> {
        &self.schemas
    }

    /// Creates a task in `PENDING`, then — unless it's scheduled in the
    /// future — publishes it and transitions to `QUEUED`.
    pub async fn create(&self, new_task: NewTask) -> Result<Task> {
        let mut task = Task::new(
            new_task.source_id,
            new_task.target_url,
            new_task.schema_id,
            new_task.schema_version,
            new_task.mode,
            new_task.priority,
            new_task.max_attempts,
            Utc::now(),
        );
        task.context = new_task.context;
        task.cookies = new_task.cookies;
        task.headers = new_task.headers;
        task.proxy_profile_id = new_task.proxy_profile_id;
        task.session_profile_id = new_task.session_profile_id;
        task.scheduled_at = new_task.scheduled_at;

        let task = self.tasks.create(task).await?;

        if task.scheduled_at.is_some_and(|at| at > Utc::now()) {
            info!(task_id = %task.task_id, scheduled_at = ?task.scheduled_at, "task deferred");
            return Ok(task);
        }

        self.dispatch(task, new_task.timeout_seconds, new_task.ttl_seconds).await
    }

    /// Publishes any `PENDING` tasks whose `scheduled_at` has passed.
    pub async fn dispatch_due(&self, timeout_seconds: u64, ttl_seconds: u64) -> Result<usize> {
        let due = self.tasks.due_scheduled(Utc::now()).await?;
        let count = due.len();
        for task in due {
            self.dispatch(task, timeout_seconds, ttl_seconds).await?;
        }
        Ok(count)
    }

    async fn dispatch(&self, mut task: Task, timeout_seconds: u64, ttl_seconds: u64) -> Result<Task> {
        let run_id = Uuid::new_v4();
        task.current_run_id = Some(run_id);
        task.current_attempt += 1;

        let envelope = TaskEnvelope {
            task_id: task.task_id,
            run_id,
            source_id: task.source_id.clone(),
            target_url: task.target_url.clone(),
            mode: task.mode,
            schema_id: task.schema_id,
            schema_version: task.schema_version.clone(),
            priority: task.priority,
            max_attempts: task.max_attempts,
            ttl_seconds,
            timeout_seconds,
            proxy_profile_id: task.proxy_profile_id.clone(),
            session_profile_id: task.session_profile_id.clone(),
            context: task.context.clone(),
            cookies: task.cookies.clone(),
            headers: task.headers.clone(),
            page_number: task.page_number,
            max_pages: task.max_pages,
            created_at: task.created_at,
            scheduled_at: task.scheduled_at,
            attempt: task.current_attempt,
            parent_task_id: task.parent_task_id,
            branch_id: None,
        };

        self.bus.publish_task(&envelope).await?;
        task.status = TaskStatus::Queued;
        self.tasks.update(task.clone()).await?;

        info!(task_id = %task.task_id, run_id = %run_id, attempt = task.current_attempt, "task dispatched");
        Ok(task)
    }

    /// Ingests a result envelope. Idempotent on `run_id`: a duplicate result
    /// for an already-recorded run is a no-op.
    pub async fn ingest_result(
        &self,
        result: ResultEnvelope,
        timeout_seconds: u64,
        ttl_seconds: u64,
    ) -> Result<()> {
        if self.tasks.run_exists(result.run_id).await? {
            warn!(run_id = %result.run_id, "duplicate result ingestion ignored");
            return Ok(());
        }

        let mut task = self
            .tasks
            .get(result.task_id)
            .await?
            .ok_or(Error::TaskNotFound(result.task_id))?;

        self.tasks
            .record_run(TaskRun {
                task_id: task.task_id,
                run_id: result.run_id,
                attempt: task.current_attempt,
                http_status: result.http_status,
                duration_ms: result.metrics.duration_ms,
                bytes_downloaded: result.metrics.bytes_downloaded,
                requests_count: result.metrics.requests_count,
                pages_processed: result.metrics.pages_processed,
                records_extracted: result.extraction.records_extracted,
                records_valid: result.extraction.records_valid,
                records_rejected: result.extraction.records_rejected,
                pointers: result.pointers.clone(),
                errors: result.errors.clone(),
                worker_id: result.worker_id.clone(),
                status: status_from_run(result.status),
                started_at: result.started_at,
                completed_at: result.completed_at,
            })
            .await?;

        if task.status == TaskStatus::Cancelled {
            warn!(task_id = %task.task_id, run_id = %result.run_id, "late result for cancelled task recorded, status left unchanged");
            return Ok(());
        }

        task.pointers = merge_pointers(task.pointers, result.pointers.clone());
        task.errors = result.errors.clone();

        match result.status {
            RunStatus::Success => {
                task.status = TaskStatus::Success;
                task.completed_at = Some(result.completed_at);
                self.tasks.update(task).await?;
            }
            RunStatus::Partial => {
                task.status = TaskStatus::Partial;
                task.completed_at = Some(result.completed_at);
                self.tasks.update(task).await?;
            }
            RunStatus::Failed => {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(result.completed_at);
                self.tasks.update(task).await?;
            }
            RunStatus::Retry => {
                if task.current_attempt < task.max_attempts {
                    self.tasks.update(task.clone()).await?;
                    self.dispatch(task, timeout_seconds, ttl_seconds).await?;
                } else {
                    task.status = TaskStatus::Dlq;
                    task.completed_at = Some(result.completed_at);
                    self.tasks.update(task).await?;
                }
            }
        }

        Ok(())
    }

    /// Operator command: only valid for `FAILED`/`DLQ`. Resets attempt
    /// count and republishes.
    pub async fn retry(&self, task_id: Uuid, timeout_seconds: u64, ttl_seconds: u64) -> Result<Task> {
        let mut task = self.tasks.get(task_id).await?.ok_or(Error::TaskNotFound(task_id))?;

        if !matches!(task.status, TaskStatus::Failed | TaskStatus::Dlq) {
            return Err(Error::InvalidTransition {
                task_id,
                from: task.status,
                action: "retry",
            });
        }

        task.current_attempt = 0;
        task.errors.clear();
        task.completed_at = None;
        self.dispatch(task, timeout_seconds, ttl_seconds).await
    }

    /// Operator command: only valid for `PENDING`/`QUEUED`.
    pub async fn cancel(&self, task_id: Uuid) -> Result<Task> {
        let mut task = self.tasks.get(task_id).await?.ok_or(Error::TaskNotFound(task_id))?;

        if !matches!(task.status, TaskStatus::Pending | TaskStatus::Queued) {
            return Err(Error::InvalidTransition {
                task_id,
                from: task.status,
                action: "cancel",
            });
        }

        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(Utc::now());
        self.tasks.update(task.clone()).await?;
        Ok(task)
    }

    pub async fn get(&self, task_id: Uuid) -> Result<Option<Task>> {
        self.tasks.get(task_id).await
    }

    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.tasks.list(filter).await
    }

    pub async fn stats(&self) -> Result<TaskStats> {
        self.tasks.stats().await
    }
}

fn status_from_run(status: RunStatus) -> TaskStatus {
    match status {
        RunStatus::Success => TaskStatus::Success,
        RunStatus::Partial => TaskStatus::Partial,
        RunStatus::Failed => TaskStatus::Failed,
        RunStatus::Retry => TaskStatus::Retry,
    }
}

fn merge_pointers(mut existing: Pointers, incoming: Pointers) -> Pointers {
    if incoming.bronze_path.is_some() {
        existing.bronze_path = incoming.bronze_path;
    }
    if incoming.raw_html_path.is_some() {
        existing.raw_html_path = incoming.raw_html_path;
    }
    if incoming.screenshot_path.is_some() {
        existing.screenshot_path = incoming.screenshot_path;
    }
    existing.artifacts.extend(incoming.artifacts);
    existing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemorySchemaStore, MemoryTaskStore};
    use bus::{ExtractionStats, Metrics, MockBus};

    fn coordinator() -> (Coordinator, Arc<MockBus>) {
        let bus = Arc::new(MockBus::new());
        let coordinator = Coordinator::new(
            Arc::new(MemoryTaskStore::new()),
            Arc::new(MemorySchemaStore::new()),
            bus.clone(),
        );
        (coordinator, bus)
    }

    fn new_task() -> NewTask {
        NewTask {
            source_id: "demo-source".into(),
            target_url: "https://example.com/catalog".into(),
            schema_id: Uuid::new_v4(),
            schema_version: SchemaVersion::Pinned(1),
            mode: FetchMode::Http,
            priority: 5,
            max_attempts: 3,
            timeout_seconds: 30,
            ttl_seconds: 3600,
            context: HashMap::new(),
            cookies: HashMap::new(),
            headers: HashMap::new(),
            proxy_profile_id: None,
            session_profile_id: None,
            scheduled_at: None,
        }
    }

    #[tokio::test]
    async fn create_publishes_and_transitions_to_queued() {
        let (coordinator, bus) = coordinator();
        let task = coordinator.create(new_task()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(bus.task_count(), 1);
    }

    #[tokio::test]
    async fn cancel_only_valid_before_running() {
        let (coordinator, _bus) = coordinator();
        let task = coordinator.create(new_task()).await.unwrap();
        let cancelled = coordinator.cancel(task.task_id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);

        let err = coordinator.cancel(task.task_id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn duplicate_result_ingestion_is_idempotent() {
        let (coordinator, _bus) = coordinator();
        let task = coordinator.create(new_task()).await.unwrap();
        let run_id = task.current_run_id.unwrap();

        let result = ResultEnvelope {
            task_id: task.task_id,
            run_id,
            status: RunStatus::Success,
            http_status: Some(200),
            metrics: Metrics::default(),
            pointers: Pointers::default(),
            extraction: ExtractionStats {
                records_extracted: 10,
                records_valid: 10,
                records_rejected: 0,
                ..Default::default()
            },
            has_next_page: false,
            next_page_url: None,
            current_page: 1,
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            worker_id: "worker-1".into(),
        };

        coordinator.ingest_result(result.clone(), 30, 3600).await.unwrap();
        let after_first = coordinator.get(task.task_id).await.unwrap().unwrap();
        assert_eq!(after_first.status, TaskStatus::Success);

        // A duplicate for the same run_id must leave state unchanged.
        coordinator.ingest_result(result, 30, 3600).await.unwrap();
        let after_second = coordinator.get(task.task_id).await.unwrap().unwrap();
        assert_eq!(after_second.status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn late_result_for_cancelled_task_does_not_revive_it() {
        let (coordinator, _bus) = coordinator();
        let task = coordinator.create(new_task()).await.unwrap();
        let run_id = task.current_run_id.unwrap();

        let cancelled = coordinator.cancel(task.task_id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);

        let result = ResultEnvelope {
            task_id: task.task_id,
            run_id,
            status: RunStatus::Success,
            http_status: Some(200),
            metrics: Metrics::default(),
            pointers: Pointers::default(),
            extraction: ExtractionStats {
                records_extracted: 10,
                records_valid: 10,
                records_rejected: 0,
                ..Default::default()
            },
            has_next_page: false,
            next_page_url: None,
            current_page: 1,
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            worker_id: "worker-1".into(),
        };

        coordinator.ingest_result(result, 30, 3600).await.unwrap();
        let after = coordinator.get(task.task_id).await.unwrap().unwrap();
        assert_eq!(after.status, TaskStatus::Cancelled, "a late result must not move a cancelled task");
    }

    #[tokio::test]
    async fn retry_exhausted_goes_to_dlq() {
        let (coordinator, bus) = coordinator();
        let mut task_spec = new_task();
        task_spec.max_attempts = 1;
        let task = coordinator.create(task_spec).await.unwrap();
        let run_id = task.current_run_id.unwrap();

        let result = ResultEnvelope {
            task_id: task.task_id,
            run_id,
            status: RunStatus::Retry,
            http_status: None,
            metrics: Metrics::default(),
            pointers: Pointers::default(),
            extraction: ExtractionStats::default(),
            has_next_page: false,
            next_page_url: None,
            current_page: 1,
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            worker_id: "worker-1".into(),
        };

        coordinator.ingest_result(result, 30, 3600).await.unwrap();
        let after = coordinator.get(task.task_id).await.unwrap().unwrap();
        assert_eq!(after.status, TaskStatus::Dlq);
        assert_eq!(bus.task_count(), 1, "exhausted retry must not republish");
    }
}
