use std::collections::HashMap;

use async_trait::async_trait;
use schema::{NavigationStep, PaginationRule};

use crate::error::Result;

/// A fetch request, independent of mode. Header/cookie maps are already
/// merged by the caller (schema headers overridden by task headers).
/// `navigation_steps`/`pagination` are only consulted by the browser mode.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub proxy_url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub navigation_steps: Vec<NavigationStep>,
    pub pagination: Option<PaginationRule>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            proxy_url: None,
            timeout_seconds: None,
            navigation_steps: Vec::new(),
            pagination: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub html: String,
    pub status: u16,
    pub final_url: String,
    pub headers: HashMap<String, String>,
    pub duration_ms: u64,
    pub bytes_downloaded: u64,
    pub screenshot: Option<Vec<u8>>,
}

/// Common interface over the HTTP and browser fetch modes, so the worker
/// loop can depend on one trait object and dispatch on the task's `mode`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}
