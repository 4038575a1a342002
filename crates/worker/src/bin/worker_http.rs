//! HTTP-mode worker process: consumes `tasks.http` at prefetch 10 (schema
//! §4.5) and runs the pipeline with [`HttpFetcher`].

use std::sync::Arc;

use anyhow::{Context, Result};
use bus::{AmqpBus, Bus, QUEUE_TASKS_HTTP};
use coordinator::{MemorySchemaStore, SchemaStore};
use fetch::HttpFetcher;
use object_store::ObjectStore;
use storage::{BronzeWriter, TrashWriter};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use worker::{AmqpTaskSource, SchemaCache, TaskSource, Worker, WorkerConfig, WorkerSettings};

const PREFETCH: u16 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,worker=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = WorkerSettings::from_env()?;
    tracing::info!(worker_id = %settings.worker_id, "starting http worker");

    let schema_store = schema_store(&settings).await?;

    let bus = Arc::new(AmqpBus::connect(&settings.amqp_url).await.context("failed to connect to message bus")?);
    let consumer = bus
        .consume(QUEUE_TASKS_HTTP, &settings.worker_id, PREFETCH)
        .await
        .context("failed to start consuming tasks.http")?;
    let source: Arc<dyn TaskSource> = Arc::new(AmqpTaskSource::new(consumer));

    let (object_store, _) =
        object_store::parse_url(&settings.object_store_url.parse().context("invalid OBJECT_STORE_URL")?)
            .context("failed to construct object store backend")?;
    let object_store: Arc<dyn ObjectStore> = Arc::from(object_store);
    let bronze = Arc::new(BronzeWriter::new(object_store.clone()));
    let trash = Arc::new(TrashWriter::new(object_store));

    let worker = Arc::new(Worker::new(
        Arc::new(HttpFetcher::new()),
        Arc::new(SchemaCache::new(schema_store)),
        source,
        bus as Arc<dyn Bus>,
        bronze,
        trash,
        WorkerConfig {
            concurrency: settings.concurrency,
            shutdown_grace: settings.shutdown_grace,
            worker_id: settings.worker_id,
        },
    ));

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    worker.run(shutdown).await;
    Ok(())
}

async fn schema_store(settings: &WorkerSettings) -> Result<Arc<dyn SchemaStore>> {
    #[cfg(feature = "postgres")]
    if let Some(database_url) = &settings.database_url {
        let store = coordinator::PostgresSchemaStore::new(database_url)
            .await
            .context("failed to connect schema store to database")?;
        return Ok(Arc::new(store));
    }

    let _ = settings;
    Ok(Arc::new(MemorySchemaStore::new()))
}
