//! Optional PostgreSQL-backed `TaskStore`/`SchemaStore` (schema §4.6,
//! `postgres` feature). The relational DDL and migrations this depends on
//! are the out-of-scope persistence layer named in §1/§6; this is only the
//! trait implementation, storing each record as a JSONB document keyed by
//! id so it can be adopted ahead of a full normalized schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schema::ParsingSchema;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::{SchemaStore, TaskFilter, TaskStats, TaskStore};
use crate::task::{Task, TaskRun};

pub struct PostgresTaskStore {
    pool: PgPool,
}

impl PostgresTaskStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(Error::Database)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    async fn create(&self, task: Task) -> Result<Task> {
        let payload = serde_json::to_value(&task).expect("Task always serializes");
        sqlx::query("insert into tasks (task_id, source_id, status, payload) values ($1, $2, $3, $4)")
            .bind(task.task_id)
            .bind(&task.source_id)
            .bind(format!("{:?}", task.status))
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(task)
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query("select payload from tasks where task_id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(match row {
            Some(row) => {
                let payload: serde_json::Value = row.try_get("payload").map_err(Error::Database)?;
                Some(serde_json::from_value(payload).expect("stored task payload is always valid"))
            }
            None => None,
        })
    }

    async fn update(&self, task: Task) -> Result<()> {
        let payload = serde_json::to_value(&task).expect("Task always serializes");
        sqlx::query("update tasks set status = $2, payload = $3 where task_id = $1")
            .bind(task.task_id)
            .bind(format!("{:?}", task.status))
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let rows = sqlx::query("select payload from tasks where ($1::text is null or source_id = $1)")
            .bind(&filter.source_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: serde_json::Value = row.try_get("payload").map_err(Error::Database)?;
            let task: Task = serde_json::from_value(payload).expect("stored task payload is always valid");
            if filter.status.is_none_or(|s| s == task.status) {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    async fn stats(&self) -> Result<TaskStats> {
        let rows = sqlx::query("select status, source_id, count(*) as n from tasks group by status, source_id")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut stats = TaskStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(Error::Database)?;
            let source_id: String = row.try_get("source_id").map_err(Error::Database)?;
            let n: i64 = row.try_get("n").map_err(Error::Database)?;
            *stats.by_status.entry(status).or_insert(0) += n as u64;
            *stats.by_source.entry(source_id).or_insert(0) += n as u64;
        }
        Ok(stats)
    }

    async fn record_run(&self, run: TaskRun) -> Result<()> {
        let payload = serde_json::to_value(&run).expect("TaskRun always serializes");
        sqlx::query("insert into task_runs (run_id, task_id, payload) values ($1, $2, $3) on conflict (run_id) do nothing")
            .bind(run.run_id)
            .bind(run.task_id)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn run_exists(&self, run_id: Uuid) -> Result<bool> {
        let row = sqlx::query("select 1 as present from task_runs where run_id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.is_some())
    }

    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        let rows = sqlx::query("select payload from tasks where status = 'Pending'")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut due = Vec::new();
        for row in rows {
            let payload: serde_json::Value = row.try_get("payload").map_err(Error::Database)?;
            let task: Task = serde_json::from_value(payload).expect("stored task payload is always valid");
            if task.scheduled_at.is_some_and(|at| at <= now) {
                due.push(task);
            }
        }
        Ok(due)
    }
}

pub struct PostgresSchemaStore {
    pool: PgPool,
}

impl PostgresSchemaStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(Error::Database)?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SchemaStore for PostgresSchemaStore {
    async fn get(&self, schema_id: Uuid, version: Option<u32>) -> Result<Option<ParsingSchema>> {
        let row = match version {
            Some(version) => {
                sqlx::query("select payload from schemas where schema_id = $1 and version = $2")
                    .bind(schema_id)
                    .bind(version as i32)
                    .fetch_optional(&self.pool)
                    .await
            }
            None => {
                sqlx::query(
                    "select payload from schemas where schema_id = $1 order by version desc limit 1",
                )
                .bind(schema_id)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .map_err(Error::Database)?;

        Ok(match row {
            Some(row) => {
                let payload: serde_json::Value = row.try_get("payload").map_err(Error::Database)?;
                Some(serde_json::from_value(payload).expect("stored schema payload is always valid"))
            }
            None => None,
        })
    }

    async fn put(&self, schema: ParsingSchema) -> Result<()> {
        let payload = serde_json::to_value(&schema).expect("ParsingSchema always serializes");
        sqlx::query(
            "insert into schemas (schema_id, version, payload) values ($1, $2, $3) \
             on conflict (schema_id, version) do update set payload = excluded.payload",
        )
        .bind(schema.schema_id)
        .bind(schema.version as i32)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn latest_version(&self, schema_id: Uuid) -> Result<Option<u32>> {
        let row = sqlx::query("select max(version) as v from schemas where schema_id = $1")
            .bind(schema_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.and_then(|r| r.try_get::<Option<i32>, _>("v").ok().flatten()).map(|v| v as u32))
    }
}
