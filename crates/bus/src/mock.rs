use std::sync::RwLock;

use async_trait::async_trait;

use crate::client::Bus;
use crate::envelope::{ResultEnvelope, TaskEnvelope};
use crate::error::Result;

/// An in-memory [`Bus`] that records every published envelope instead of
/// talking to a broker, mirroring this codebase's existing `TestNats` mock.
/// Used by the coordinator's and worker's own unit tests.
#[derive(Default)]
pub struct MockBus {
    tasks: RwLock<Vec<TaskEnvelope>>,
    results: RwLock<Vec<ResultEnvelope>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published_tasks(&self) -> Vec<TaskEnvelope> {
        self.tasks.read().unwrap().clone()
    }

    pub fn published_results(&self) -> Vec<ResultEnvelope> {
        self.results.read().unwrap().clone()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.read().unwrap().len()
    }

    pub fn result_count(&self) -> usize {
        self.results.read().unwrap().len()
    }

    pub fn clear(&self) {
        self.tasks.write().unwrap().clear();
        self.results.write().unwrap().clear();
    }
}

#[async_trait]
impl Bus for MockBus {
    async fn publish_task(&self, envelope: &TaskEnvelope) -> Result<()> {
        self.tasks.write().unwrap().push(envelope.clone());
        Ok(())
    }

    async fn publish_result(&self, envelope: &ResultEnvelope) -> Result<()> {
        self.results.write().unwrap().push(envelope.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{FetchMode, SchemaVersion};
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_task() -> TaskEnvelope {
        TaskEnvelope {
            task_id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            source_id: "demo".into(),
            target_url: "https://example.com".into(),
            mode: FetchMode::Http,
            schema_id: Uuid::new_v4(),
            schema_version: SchemaVersion::Pinned(1),
            priority: 5,
            max_attempts: 3,
            ttl_seconds: 3600,
            timeout_seconds: 60,
            proxy_profile_id: None,
            session_profile_id: None,
            context: Default::default(),
            cookies: Default::default(),
            headers: Default::default(),
            page_number: 1,
            max_pages: 1,
            created_at: Utc::now(),
            scheduled_at: None,
            attempt: 0,
            parent_task_id: None,
            branch_id: None,
        }
    }

    #[tokio::test]
    async fn records_published_tasks() {
        let bus = MockBus::new();
        let task = sample_task();
        bus.publish_task(&task).await.unwrap();

        assert_eq!(bus.task_count(), 1);
        assert_eq!(bus.published_tasks()[0].task_id, task.task_id);
    }

    #[tokio::test]
    async fn clear_resets_both_logs() {
        let bus = MockBus::new();
        bus.publish_task(&sample_task()).await.unwrap();
        bus.clear();
        assert_eq!(bus.task_count(), 0);
    }
}
