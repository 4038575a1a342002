//! Environment-driven settings shared by the HTTP- and browser-mode worker
//! binaries, following the same `Config::from_env` shape the rest of this
//! codebase uses for its services.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub amqp_url: String,
    pub object_store_url: String,
    pub database_url: Option<String>,
    pub worker_id: String,
    pub concurrency: usize,
    pub shutdown_grace: Duration,
}

impl WorkerSettings {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            amqp_url: env::var("AMQP_URL").context("AMQP_URL must be set")?,
            object_store_url: env::var("OBJECT_STORE_URL").context("OBJECT_STORE_URL must be set")?,
            database_url: env::var("DATABASE_URL").ok(),
            worker_id: env::var("WORKER_ID").unwrap_or_else(|_| format!("worker-{}", uuid::Uuid::new_v4())),
            concurrency: env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            shutdown_grace: Duration::from_secs(
                env::var("WORKER_SHUTDOWN_GRACE_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }
}
