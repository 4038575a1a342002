//! The worker loop (schema §4.5/§5), grounded on the job-worker pattern:
//! a fixed number of lanes each pull one task at a time from a
//! [`TaskSource`], process it, publish the result (and any pagination
//! child task), then ack. Shutdown stops new claims and drains in-flight
//! tasks up to a grace period before returning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bus::Bus;
use fetch::Fetcher;
use storage::{BronzeWriter, TrashWriter};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::pipeline::process;
use crate::schema_cache::SchemaCache;
use crate::source::{PendingTask, TaskSource};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How many tasks this worker processes concurrently. Schema §5
    /// suggests 50 for HTTP mode, 5 for browser mode (session-pool bound).
    pub concurrency: usize,
    pub shutdown_grace: Duration,
    pub worker_id: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            shutdown_grace: Duration::from_secs(30),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self { worker_id: worker_id.into(), ..Default::default() }
    }
}

/// Runs the fetch/extract/write pipeline against a `TaskSource`, generic
/// over the fetch mode (`HttpFetcher` or `BrowserFetcher`).
pub struct Worker<F: Fetcher> {
    fetcher: Arc<F>,
    schemas: Arc<SchemaCache>,
    source: Arc<dyn TaskSource>,
    bus: Arc<dyn Bus>,
    bronze: Arc<BronzeWriter>,
    trash: Arc<TrashWriter>,
    config: WorkerConfig,
    running: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
}

impl<F: Fetcher + 'static> Worker<F> {
    pub fn new(
        fetcher: Arc<F>,
        schemas: Arc<SchemaCache>,
        source: Arc<dyn TaskSource>,
        bus: Arc<dyn Bus>,
        bronze: Arc<BronzeWriter>,
        trash: Arc<TrashWriter>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            fetcher,
            schemas,
            source,
            bus,
            bronze,
            trash,
            config,
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            worker_id = %self.config.worker_id,
            concurrency = self.config.concurrency,
            "worker starting"
        );

        let lanes: Vec<_> = (0..self.config.concurrency)
            .map(|_| {
                let worker = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { worker.run_lane(shutdown).await })
            })
            .collect();

        futures::future::join_all(lanes).await;

        let running_count = self.running.read().await.len();
        if running_count > 0 {
            info!(count = running_count, "waiting for in-flight tasks to finish");

            let start = std::time::Instant::now();
            while !self.running.read().await.is_empty() && start.elapsed() < self.config.shutdown_grace {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }

            let stuck = self.running.read().await.len();
            if stuck > 0 {
                warn!(count = stuck, "shutdown grace period elapsed with tasks still in flight");
            }
        }

        info!(worker_id = %self.config.worker_id, "worker stopped");
    }

    async fn run_lane(&self, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = self.source.recv() => next,
            };

            match next {
                Ok(Some(pending)) => self.handle(pending, &shutdown).await,
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
                Err(err) => {
                    error!(error = %err, "failed to receive next task");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn handle(&self, pending: PendingTask, shutdown: &CancellationToken) {
        let PendingTask { envelope, ack } = pending;
        let task_id = envelope.task_id;

        let token = shutdown.child_token();
        self.running.write().await.insert(task_id, token.clone());

        let schema = match self.schemas.resolve(envelope.schema_id, &envelope.schema_version).await {
            Ok(schema) => schema,
            Err(err) => {
                error!(task_id = %task_id, error = %err, "schema resolution failed, dead-lettering task");
                if let Err(err) = ack.dead_letter().await {
                    warn!(task_id = %task_id, error = %err, "failed to dead-letter task message");
                }
                self.running.write().await.remove(&task_id);
                return;
            }
        };

        let outcome = process(self.fetcher.as_ref(), &schema, &envelope, &self.bronze, &self.trash, &self.config.worker_id).await;

        debug!(task_id = %task_id, status = ?outcome.result.status, "publishing result");
        if let Err(err) = self.bus.publish_result(&outcome.result).await {
            error!(task_id = %task_id, error = %err, "failed to publish result");
        }

        if let Some(child) = &outcome.child_task {
            if let Err(err) = self.bus.publish_task(child).await {
                error!(
                    task_id = %task_id,
                    child_task_id = %child.task_id,
                    error = %err,
                    "failed to publish pagination child task"
                );
            }
        }

        if let Err(err) = ack.ack().await {
            warn!(task_id = %task_id, error = %err, "failed to ack task message");
        }

        self.running.write().await.remove(&task_id);
    }
}
