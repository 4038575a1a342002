//! Per-task processing (schema §4.5 steps 2-7): fetch, extract, write
//! bronze/trash, derive pagination fan-out, and build the result envelope.
//! Nothing here mutates coordinator state; a task's fate is entirely
//! expressed in the `ResultEnvelope` (and optional child `TaskEnvelope`)
//! this returns.

use std::collections::HashMap;

use chrono::Utc;
use schema::{PaginationType, ParsingSchema};
use serde_json::Value as Json;
use tracing::{info, warn};
use uuid::Uuid;

use bus::{ErrorCode, ErrorEntry, ExtractionStats, Metrics, Pointers, ResultEnvelope, RunStatus, TaskEnvelope};
use fetch::{FetchRequest, Fetcher};
use storage::{BronzeWriter, TrashWriter, WriteContext};

use crate::pagination::derive_next_page;

pub struct Outcome {
    pub result: ResultEnvelope,
    pub child_task: Option<TaskEnvelope>,
}

pub async fn process(
    fetcher: &dyn Fetcher,
    schema: &ParsingSchema,
    envelope: &TaskEnvelope,
    bronze: &BronzeWriter,
    trash: &TrashWriter,
    worker_id: &str,
) -> Outcome {
    let started_at = Utc::now();

    let response = match fetcher.fetch(&build_request(schema, envelope)).await {
        Ok(response) => response,
        Err(err) => {
            let entry = fetch_error_entry(&err);
            let status = terminal_status(envelope, std::slice::from_ref(&entry), 0);
            return Outcome {
                result: build_result(
                    envelope,
                    worker_id,
                    started_at,
                    None,
                    Metrics::default(),
                    Pointers::default(),
                    ExtractionStats::default(),
                    vec![entry],
                    false,
                    None,
                    status,
                ),
                child_task: None,
            };
        }
    };

    let write_ctx = WriteContext {
        source_id: envelope.source_id.clone(),
        schema_id: envelope.schema_id,
        task_id: envelope.task_id,
        run_id: envelope.run_id,
        ingested_at: started_at,
    };

    let metrics = Metrics {
        duration_ms: response.duration_ms,
        bytes_downloaded: response.bytes_downloaded,
        requests_count: 1,
        pages_processed: 1,
        dns_lookup_ms: None,
        connection_ms: None,
        ttfb_ms: None,
    };

    let outcome = match extract::extract(schema, &response.html, &response.final_url) {
        Ok(outcome) => outcome,
        Err(err) => {
            let entry = extract_error_entry(&err);
            if response.screenshot.is_some() {
                trash
                    .write_debug_best_effort(&write_ctx, Some(&response.html), response.screenshot.as_deref(), &Json::Null)
                    .await;
            }
            return Outcome {
                result: build_result(
                    envelope,
                    worker_id,
                    started_at,
                    Some(response.status),
                    metrics,
                    Pointers::default(),
                    ExtractionStats::default(),
                    vec![entry],
                    false,
                    None,
                    RunStatus::Failed,
                ),
                child_task: None,
            };
        }
    };

    let mut errors = Vec::new();
    let mut pointers = Pointers::default();

    if !outcome.records.is_empty() {
        let records_json = to_json_records(&outcome.records);
        match bronze.write(&write_ctx, &records_json).await {
            Ok(prefix) => pointers.bronze_path = Some(prefix),
            Err(err) => {
                warn!(task_id = %envelope.task_id, error = %err, "bronze write failed");
                errors.push(storage_error_entry(&err));
            }
        }
    }

    if !outcome.rejected_records.is_empty() {
        let rejected_json = to_json_records(&outcome.rejected_records);
        trash
            .write_rejected_best_effort(&write_ctx, "required field missing or failed validation", &rejected_json)
            .await;
    }

    if response.screenshot.is_some() {
        trash
            .write_debug_best_effort(
                &write_ctx,
                Some(&response.html),
                response.screenshot.as_deref(),
                &Json::Null,
            )
            .await;
        pointers.raw_html_path = Some(format!("{}/page.html", write_ctx.trash_debug_prefix()));
        pointers.screenshot_path = Some(format!("{}/screenshot.png", write_ctx.trash_debug_prefix()));
    }

    let (has_next_page, next_page_url, child_task) = resolve_pagination(schema, envelope, &response.html, &response.final_url);

    let extraction = ExtractionStats {
        records_extracted: outcome.records_extracted,
        records_valid: outcome.records_valid(),
        records_rejected: outcome.records_rejected,
        fields_extracted: HashMap::new(),
        fields_missing: HashMap::new(),
    };

    let status = terminal_status(envelope, &errors, extraction.records_valid);

    info!(
        task_id = %envelope.task_id,
        run_id = %envelope.run_id,
        status = ?status,
        records_valid = extraction.records_valid,
        "task processed"
    );

    Outcome {
        result: build_result(
            envelope,
            worker_id,
            started_at,
            Some(response.status),
            metrics,
            pointers,
            extraction,
            errors,
            has_next_page,
            next_page_url,
            status,
        ),
        child_task,
    }
}

fn build_request(schema: &ParsingSchema, envelope: &TaskEnvelope) -> FetchRequest {
    let mut headers = schema.request_headers.clone();
    headers.extend(envelope.headers.clone());

    let pagination = (schema.pagination.kind == PaginationType::InfiniteScroll).then(|| schema.pagination.clone());

    FetchRequest {
        url: envelope.target_url.clone(),
        headers,
        cookies: envelope.cookies.clone(),
        proxy_url: None,
        timeout_seconds: Some(envelope.timeout_seconds),
        navigation_steps: schema.navigation_steps.clone(),
        pagination,
    }
}

fn resolve_pagination(
    schema: &ParsingSchema,
    envelope: &TaskEnvelope,
    html: &str,
    final_url: &str,
) -> (bool, Option<String>, Option<TaskEnvelope>) {
    if !matches!(schema.pagination.kind, PaginationType::NextButton | PaginationType::PageParam) {
        return (false, None, None);
    }
    if envelope.page_number >= envelope.max_pages {
        return (false, None, None);
    }

    match derive_next_page(schema, html, final_url) {
        Some(next_url) => {
            let child = build_child_task(envelope, next_url.clone());
            (true, Some(next_url), Some(child))
        }
        None => (false, None, None),
    }
}

fn build_child_task(parent: &TaskEnvelope, next_url: String) -> TaskEnvelope {
    TaskEnvelope {
        task_id: Uuid::new_v4(),
        run_id: Uuid::new_v4(),
        source_id: parent.source_id.clone(),
        target_url: next_url,
        mode: parent.mode,
        schema_id: parent.schema_id,
        schema_version: parent.schema_version.clone(),
        priority: parent.priority,
        max_attempts: parent.max_attempts,
        ttl_seconds: parent.ttl_seconds,
        timeout_seconds: parent.timeout_seconds,
        proxy_profile_id: parent.proxy_profile_id.clone(),
        session_profile_id: parent.session_profile_id.clone(),
        context: parent.context.clone(),
        cookies: parent.cookies.clone(),
        headers: parent.headers.clone(),
        page_number: parent.page_number + 1,
        max_pages: parent.max_pages,
        created_at: Utc::now(),
        scheduled_at: None,
        attempt: 1,
        parent_task_id: Some(parent.task_id),
        branch_id: parent.branch_id.clone(),
    }
}

fn to_json_records(records: &[extract::Record]) -> Vec<Json> {
    records.iter().map(|r| serde_json::to_value(r).unwrap_or(Json::Null)).collect()
}

#[allow(clippy::too_many_arguments)]
fn build_result(
    envelope: &TaskEnvelope,
    worker_id: &str,
    started_at: chrono::DateTime<Utc>,
    http_status: Option<u16>,
    metrics: Metrics,
    pointers: Pointers,
    extraction: ExtractionStats,
    errors: Vec<ErrorEntry>,
    has_next_page: bool,
    next_page_url: Option<String>,
    status: RunStatus,
) -> ResultEnvelope {
    ResultEnvelope {
        task_id: envelope.task_id,
        run_id: envelope.run_id,
        status,
        http_status,
        metrics,
        pointers,
        extraction,
        has_next_page,
        next_page_url,
        current_page: envelope.page_number,
        errors,
        started_at,
        completed_at: Utc::now(),
        worker_id: worker_id.to_string(),
    }
}

/// The total, mechanical mapping from "what went wrong" to a terminal run
/// status (schema §7): a non-retryable error fails the task outright; a
/// retryable one retries while attempts remain, else fails; otherwise the
/// presence of valid records decides success vs. partial.
fn terminal_status(envelope: &TaskEnvelope, errors: &[ErrorEntry], records_valid: usize) -> RunStatus {
    let non_retryable = errors.iter().any(|e| !e.is_retryable);
    let retryable = errors.iter().any(|e| e.is_retryable);

    if non_retryable {
        RunStatus::Failed
    } else if retryable {
        if envelope.attempt < envelope.max_attempts {
            RunStatus::Retry
        } else {
            RunStatus::Failed
        }
    } else if records_valid > 0 {
        RunStatus::Success
    } else {
        RunStatus::Partial
    }
}

fn fetch_error_entry(err: &fetch::Error) -> ErrorEntry {
    let (code, is_retryable) = match err {
        fetch::Error::Security(_) => (ErrorCode::Blocked, false),
        fetch::Error::Http(_) => (ErrorCode::ConnectionError, true),
        fetch::Error::HttpStatus { status, .. } => (ErrorCode::HttpError, matches!(status, 429 | 500 | 502 | 503 | 504)),
        fetch::Error::Timeout { .. } => (ErrorCode::Timeout, true),
        fetch::Error::Browser(_) => (ErrorCode::Unknown, true),
        fetch::Error::NavigationStep(_) => (ErrorCode::SelectorNotFound, true),
        fetch::Error::PoolExhausted => (ErrorCode::Unknown, true),
    };
    ErrorEntry::new(code, err.to_string()).retryable(is_retryable)
}

fn extract_error_entry(err: &extract::Error) -> ErrorEntry {
    ErrorEntry::new(ErrorCode::ParseError, err.to_string()).retryable(false)
}

fn storage_error_entry(err: &storage::Error) -> ErrorEntry {
    ErrorEntry::new(ErrorCode::Unknown, err.to_string()).retryable(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bus::{FetchMode as BusFetchMode, SchemaVersion};
    use object_store::memory::InMemory;
    use schema::{ExtractionMethod, FetchMode, FieldDefinition, FieldType, PaginationRule};
    use std::collections::HashMap;
    use uuid::Uuid;

    struct StubFetcher {
        result: std::sync::Mutex<Option<fetch::Result<fetch::FetchResponse>>>,
    }

    impl StubFetcher {
        fn ok(response: fetch::FetchResponse) -> Self {
            Self { result: std::sync::Mutex::new(Some(Ok(response))) }
        }

        fn err(err: fetch::Error) -> Self {
            Self { result: std::sync::Mutex::new(Some(Err(err))) }
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, _request: &FetchRequest) -> fetch::Result<fetch::FetchResponse> {
            self.result.lock().unwrap().take().expect("fetch called more than once")
        }
    }

    fn response(html: &str) -> fetch::FetchResponse {
        fetch::FetchResponse {
            html: html.to_string(),
            status: 200,
            final_url: "https://example.com/catalog?page=1".to_string(),
            headers: HashMap::new(),
            duration_ms: 12,
            bytes_downloaded: html.len() as u64,
            screenshot: None,
        }
    }

    fn catalog_schema(pagination: PaginationRule) -> ParsingSchema {
        let name = FieldDefinition::new("name", FieldType::String, ExtractionMethod::Css, "h2").required();
        ParsingSchema::new(Uuid::nil(), 1, "demo-source", "https://example.com/catalog", vec![name], FetchMode::Http)
            .with_item_container("div.item")
            .with_pagination(pagination)
    }

    fn envelope(schema_id: Uuid, max_pages: u32) -> TaskEnvelope {
        TaskEnvelope {
            task_id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            source_id: "demo-source".to_string(),
            target_url: "https://example.com/catalog?page=1".to_string(),
            mode: BusFetchMode::Http,
            schema_id,
            schema_version: SchemaVersion::Pinned(1),
            priority: 5,
            max_attempts: 3,
            ttl_seconds: 3600,
            timeout_seconds: 30,
            proxy_profile_id: None,
            session_profile_id: None,
            context: HashMap::new(),
            cookies: HashMap::new(),
            headers: HashMap::new(),
            page_number: 1,
            max_pages,
            created_at: Utc::now(),
            scheduled_at: None,
            attempt: 1,
            parent_task_id: None,
            branch_id: None,
        }
    }

    async fn stores() -> (BronzeWriter, TrashWriter) {
        let store: std::sync::Arc<dyn object_store::ObjectStore> = std::sync::Arc::new(InMemory::new());
        (BronzeWriter::new(store.clone()), TrashWriter::new(store))
    }

    #[tokio::test]
    async fn successful_extraction_yields_success_with_bronze_pointer() {
        let schema = catalog_schema(PaginationRule::none());
        let html = r#"<html><body><div class="item"><h2>Widget</h2></div></body></html>"#;
        let fetcher = StubFetcher::ok(response(html));
        let env = envelope(schema.schema_id, 1);
        let (bronze, trash) = stores().await;

        let outcome = process(&fetcher, &schema, &env, &bronze, &trash, "worker-1").await;

        assert_eq!(outcome.result.status, RunStatus::Success);
        assert!(outcome.result.pointers.bronze_path.is_some());
        assert_eq!(outcome.result.extraction.records_valid, 1);
        assert!(outcome.child_task.is_none());
    }

    #[tokio::test]
    async fn retryable_fetch_error_retries_while_attempts_remain() {
        let schema = catalog_schema(PaginationRule::none());
        let fetcher = StubFetcher::err(fetch::Error::Timeout { url: "https://example.com".into() });
        let env = envelope(schema.schema_id, 1);
        let (bronze, trash) = stores().await;

        let outcome = process(&fetcher, &schema, &env, &bronze, &trash, "worker-1").await;

        assert_eq!(outcome.result.status, RunStatus::Retry);
        assert_eq!(outcome.result.errors[0].code, ErrorCode::Timeout);
        assert!(outcome.child_task.is_none());
    }

    #[tokio::test]
    async fn exhausted_retryable_fetch_error_fails() {
        let schema = catalog_schema(PaginationRule::none());
        let fetcher = StubFetcher::err(fetch::Error::Timeout { url: "https://example.com".into() });
        let mut env = envelope(schema.schema_id, 1);
        env.attempt = env.max_attempts;
        let (bronze, trash) = stores().await;

        let outcome = process(&fetcher, &schema, &env, &bronze, &trash, "worker-1").await;
        assert_eq!(outcome.result.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn zero_valid_records_is_partial() {
        let schema = catalog_schema(PaginationRule::none());
        let fetcher = StubFetcher::ok(response("<html><body>no items</body></html>"));
        let env = envelope(schema.schema_id, 1);
        let (bronze, trash) = stores().await;

        let outcome = process(&fetcher, &schema, &env, &bronze, &trash, "worker-1").await;
        assert_eq!(outcome.result.status, RunStatus::Partial);
        assert!(outcome.result.pointers.bronze_path.is_none());
    }

    #[tokio::test]
    async fn pagination_fan_out_produces_one_child_task_with_incremented_page() {
        let schema = catalog_schema(PaginationRule::next_button("a.next", 10));
        let html = r#"<html><body>
            <div class="item"><h2>Widget</h2></div>
            <a class="next" href="/catalog?page=2">Next</a>
        </body></html>"#;
        let fetcher = StubFetcher::ok(response(html));
        let env = envelope(schema.schema_id, 10);
        let (bronze, trash) = stores().await;

        let outcome = process(&fetcher, &schema, &env, &bronze, &trash, "worker-1").await;

        assert!(outcome.result.has_next_page);
        let child = outcome.child_task.expect("expected a pagination child task");
        assert_eq!(child.page_number, env.page_number + 1);
        assert_eq!(child.parent_task_id, Some(env.task_id));
        assert_ne!(child.task_id, env.task_id);
        assert_eq!(child.target_url, "https://example.com/catalog?page=2");
    }

    #[tokio::test]
    async fn pagination_stops_at_max_pages() {
        let schema = catalog_schema(PaginationRule::next_button("a.next", 10));
        let html = r#"<html><body>
            <div class="item"><h2>Widget</h2></div>
            <a class="next" href="/catalog?page=2">Next</a>
        </body></html>"#;
        let fetcher = StubFetcher::ok(response(html));
        let mut env = envelope(schema.schema_id, 1);
        env.page_number = 1;
        let (bronze, trash) = stores().await;

        let outcome = process(&fetcher, &schema, &env, &bronze, &trash, "worker-1").await;
        assert!(!outcome.result.has_next_page);
        assert!(outcome.child_task.is_none());
    }
}
