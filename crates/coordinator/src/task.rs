//! The task lifecycle state machine (schema §3/§4.6).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use bus::{ErrorEntry, FetchMode, Pointers, SchemaVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Running,
    Success,
    Partial,
    Failed,
    Cancelled,
    Dlq,
    Retry,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Partial | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Dlq
        )
    }
}

/// A task record, owned by the coordinator (schema §3's "Ownership" note).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub source_id: String,
    pub target_url: String,
    pub schema_id: Uuid,
    pub schema_version: SchemaVersion,
    pub mode: FetchMode,
    pub status: TaskStatus,
    pub priority: u8,
    pub max_attempts: u32,
    pub current_attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<Uuid>,
    #[serde(default)]
    pub context: HashMap<String, Json>,
    pub page_number: u32,
    pub max_pages: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_profile_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_profile_id: Option<String>,
    #[serde(default)]
    pub cookies: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pointers: Pointers,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
    /// The `run_id` of the attempt currently (or most recently) in flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_run_id: Option<Uuid>,
}

impl Task {
    pub fn new(
        source_id: impl Into<String>,
        target_url: impl Into<String>,
        schema_id: Uuid,
        schema_version: SchemaVersion,
        mode: FetchMode,
        priority: u8,
        max_attempts: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            source_id: source_id.into(),
            target_url: target_url.into(),
            schema_id,
            schema_version,
            mode,
            status: TaskStatus::Pending,
            priority,
            max_attempts,
            current_attempt: 0,
            parent_task_id: None,
            context: HashMap::new(),
            page_number: 1,
            max_pages: 1,
            scheduled_at: None,
            proxy_profile_id: None,
            session_profile_id: None,
            cookies: HashMap::new(),
            headers: HashMap::new(),
            created_at,
            completed_at: None,
            pointers: Pointers::default(),
            errors: Vec::new(),
            current_run_id: None,
        }
    }
}

/// One row per execution attempt (schema §3 "Task Run").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    pub task_id: Uuid,
    pub run_id: Uuid,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub duration_ms: u64,
    pub bytes_downloaded: u64,
    pub requests_count: u32,
    pub pages_processed: u32,
    pub records_extracted: usize,
    pub records_valid: usize,
    pub records_rejected: usize,
    pub pointers: Pointers,
    pub errors: Vec<ErrorEntry>,
    pub worker_id: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}
