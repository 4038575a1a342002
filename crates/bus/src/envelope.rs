use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    Http,
    Browser,
}

/// The wire shape of a task queue message (schema §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: Uuid,
    pub run_id: Uuid,
    pub source_id: String,
    pub target_url: String,
    pub mode: FetchMode,
    pub schema_id: Uuid,
    pub schema_version: SchemaVersion,
    pub priority: u8,
    pub max_attempts: u32,
    pub ttl_seconds: u64,
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_profile_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_profile_id: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, Json>,
    #[serde(default)]
    pub cookies: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub page_number: u32,
    pub max_pages: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SchemaVersion {
    Latest(LatestTag),
    Pinned(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatestTag {
    Latest,
}

impl TaskEnvelope {
    pub fn routing_key(&self) -> &'static str {
        match self.mode {
            FetchMode::Http => crate::topology::ROUTING_TASK_HTTP,
            FetchMode::Browser => crate::topology::ROUTING_TASK_BROWSER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
    Retry,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub duration_ms: u64,
    pub bytes_downloaded: u64,
    pub requests_count: u32,
    pub pages_processed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_lookup_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttfb_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pointers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bronze_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_html_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(default)]
    pub artifacts: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub records_extracted: usize,
    pub records_valid: usize,
    pub records_rejected: usize,
    #[serde(default)]
    pub fields_extracted: HashMap<String, u32>,
    #[serde(default)]
    pub fields_missing: HashMap<String, u32>,
}

/// A closed error code, always one of the set named in schema §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Timeout,
    ConnectionError,
    HttpError,
    ProxyError,
    SelectorNotFound,
    ValidationError,
    RateLimited,
    Blocked,
    Captcha,
    AuthRequired,
    ParseError,
    Unknown,
}

impl ErrorCode {
    /// The default retryability of this code absent any overriding context
    /// (schema §7). HTTP-status-derived retryability is computed separately
    /// by callers that know the status code.
    pub fn default_is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::Timeout | ErrorCode::ConnectionError | ErrorCode::ProxyError | ErrorCode::RateLimited
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub code: ErrorCode,
    pub message: String,
    pub is_retryable: bool,
    #[serde(default)]
    pub context: HashMap<String, Json>,
}

impl ErrorEntry {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            is_retryable: code.default_is_retryable(),
            code,
            message: message.into(),
            context: HashMap::new(),
        }
    }

    pub fn retryable(mut self, is_retryable: bool) -> Self {
        self.is_retryable = is_retryable;
        self
    }
}

/// The wire shape of a result queue message (schema §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub task_id: Uuid,
    pub run_id: Uuid,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub metrics: Metrics,
    pub pointers: Pointers,
    pub extraction: ExtractionStats,
    pub has_next_page: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_url: Option<String>,
    pub current_page: u32,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub worker_id: String,
}
