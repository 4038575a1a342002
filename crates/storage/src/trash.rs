use std::sync::Arc;

use object_store::path::Path;
use object_store::ObjectStore;
use serde_json::{json, Value as Json};

use crate::error::Result;
use crate::partition::WriteContext;

/// Rejected records and debug artifacts (schema §4.8/§6). A plain
/// S3-compatible object store area — no columnar format, since these are
/// diagnostic, not analytical.
pub struct TrashWriter {
    store: Arc<dyn ObjectStore>,
}

impl TrashWriter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Writes rejected records as a single JSON document at
    /// `rejected/<yyyy>/<mm>/<dd>/<task_id>.json`.
    pub async fn write_rejected(&self, ctx: &WriteContext, reason: &str, records: &[Json]) -> Result<()> {
        let document = json!({
            "task_id": ctx.task_id,
            "reason": reason,
            "timestamp": ctx.ingested_at.to_rfc3339(),
            "records": records,
        });

        let path = Path::from(ctx.trash_rejected_path());
        self.store.put(&path, serde_json::to_vec(&document)?.into()).await?;
        Ok(())
    }

    /// Writes whichever debug artifacts are present under
    /// `debug/<yyyy>/<mm>/<dd>/<task_id>/`.
    pub async fn write_debug(
        &self,
        ctx: &WriteContext,
        html: Option<&str>,
        screenshot: Option<&[u8]>,
        metadata: &Json,
    ) -> Result<()> {
        let prefix = ctx.trash_debug_prefix();

        if let Some(html) = html {
            let path = Path::from(format!("{prefix}/page.html"));
            self.store.put(&path, html.as_bytes().to_vec().into()).await?;
        }

        if let Some(bytes) = screenshot {
            let path = Path::from(format!("{prefix}/screenshot.png"));
            self.store.put(&path, bytes.to_vec().into()).await?;
        }

        let metadata_path = Path::from(format!("{prefix}/metadata.json"));
        self.store
            .put(&metadata_path, serde_json::to_vec(metadata)?.into())
            .await?;

        Ok(())
    }

    /// Fire-and-forget variant of [`TrashWriter::write_rejected`]: logs
    /// failure instead of propagating it, matching the requirement that a
    /// trash write never fails the task it's attached to.
    pub async fn write_rejected_best_effort(&self, ctx: &WriteContext, reason: &str, records: &[Json]) {
        if let Err(err) = self.write_rejected(ctx, reason, records).await {
            tracing::warn!(task_id = %ctx.task_id, error = %err, "failed to write trash record");
        }
    }

    /// Fire-and-forget variant of [`TrashWriter::write_debug`].
    pub async fn write_debug_best_effort(
        &self,
        ctx: &WriteContext,
        html: Option<&str>,
        screenshot: Option<&[u8]>,
        metadata: &Json,
    ) {
        if let Err(err) = self.write_debug(ctx, html, screenshot, metadata).await {
            tracing::warn!(task_id = %ctx.task_id, error = %err, "failed to write debug artifacts");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use object_store::memory::InMemory;
    use serde_json::json;
    use uuid::Uuid;

    fn fixed_context() -> WriteContext {
        WriteContext {
            source_id: "demo-source".into(),
            schema_id: Uuid::nil(),
            task_id: Uuid::nil(),
            run_id: Uuid::nil(),
            ingested_at: "2026-07-28T00:00:00Z".parse::<DateTime<Utc>>().unwrap(),
        }
    }

    #[tokio::test]
    async fn writes_rejected_records_at_the_expected_path() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let writer = TrashWriter::new(store.clone());
        let ctx = fixed_context();

        writer
            .write_rejected(&ctx, "missing required field", &[json!({"name": null})])
            .await
            .unwrap();

        let expected = Path::from(format!("rejected/2026/07/28/{}.json", Uuid::nil()));
        let fetched = store.get(&expected).await.unwrap().bytes().await.unwrap();
        let document: Json = serde_json::from_slice(&fetched).unwrap();
        assert_eq!(document["reason"], "missing required field");
    }

    #[tokio::test]
    async fn write_rejected_best_effort_never_panics_on_failure() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let writer = TrashWriter::new(store);
        let ctx = fixed_context();
        writer.write_rejected_best_effort(&ctx, "reason", &[]).await;
    }
}
