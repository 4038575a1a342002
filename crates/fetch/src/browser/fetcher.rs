//! Browser-mode fetcher (schema §4.4): acquires a pooled context, runs the
//! schema's navigation script, optionally drives infinite scroll, and
//! captures HTML plus a debug screenshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use tracing::{debug, warn};

use crate::browser::navigation::{run_infinite_scroll, run_navigation_steps};
use crate::browser::pool::SessionPool;
use crate::browser::stealth::{DEFAULT_USER_AGENT, STEALTH_INIT_SCRIPT, VIEWPORT_HEIGHT, VIEWPORT_WIDTH};
use crate::error::{Error, Result};
use crate::types::{FetchRequest, FetchResponse, Fetcher};
use crate::validator::UrlValidator;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct BrowserFetcher {
    pool: Arc<SessionPool>,
    validator: UrlValidator,
    user_agent: String,
}

impl BrowserFetcher {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool: SessionPool::new(pool_size),
            validator: UrlValidator::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_validator(mut self, validator: UrlValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    async fn fetch_inner(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.validator.validate_with_dns(&request.url).await?;

        let started = Instant::now();
        let timeout = Duration::from_secs(request.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS));

        let mut guard = self.pool.acquire().await?;
        let outcome = tokio::time::timeout(timeout, self.run_page(guard.browser(), request)).await;

        let result = match outcome {
            Ok(inner) => inner,
            Err(_) => Err(Error::Timeout { url: request.url.clone() }),
        };

        if result.is_err() {
            guard.mark_failed();
        }

        let succeeded = result.is_ok();
        guard.finish(!succeeded).await;

        let mut response = result?;
        response.duration_ms = started.elapsed().as_millis() as u64;
        Ok(response)
    }

    async fn run_page(&self, browser: &chromiumoxide::Browser, request: &FetchRequest) -> Result<FetchResponse> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| Error::Browser(e.to_string()))?;

        self.prepare_page(&page, request).await?;

        debug!(url = %request.url, "browser navigating");
        page.goto(&request.url)
            .await
            .map_err(|e| Error::Browser(e.to_string()))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| Error::Browser(e.to_string()))?;

        // Approximate `networkidle`: chromiumoxide has no first-class idle
        // event, so settle for a short quiet period after load.
        tokio::time::sleep(Duration::from_millis(300)).await;

        run_navigation_steps(&page, &request.navigation_steps).await?;

        if let Some(pagination) = &request.pagination {
            run_infinite_scroll(&page, pagination).await?;
        }

        let html = page.content().await.map_err(|e| Error::Browser(e.to_string()))?;
        let screenshot = page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(|e| {
                warn!(url = %request.url, error = %e, "failed to capture debug screenshot");
                e
            })
            .ok();

        let final_url = page.url().await.ok().flatten().unwrap_or_else(|| request.url.clone());
        let bytes_downloaded = html.len() as u64;

        if let Err(err) = page.close().await {
            debug!(error = %err, "failed to close page");
        }

        Ok(FetchResponse {
            html,
            status: 200,
            final_url,
            headers: Default::default(),
            duration_ms: 0,
            bytes_downloaded,
            screenshot,
        })
    }

    async fn prepare_page(&self, page: &Page, request: &FetchRequest) -> Result<()> {
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_INIT_SCRIPT))
            .await
            .map_err(|e| Error::Browser(e.to_string()))?;

        page.set_user_agent(&self.user_agent)
            .await
            .map_err(|e| Error::Browser(e.to_string()))?;

        let _ = (VIEWPORT_WIDTH, VIEWPORT_HEIGHT);

        if !request.cookies.is_empty() {
            let host = url::Url::parse(&request.url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_default();

            let cookies: Vec<CookieParam> = request
                .cookies
                .iter()
                .map(|(name, value)| CookieParam::builder().name(name).value(value).domain(&host).build())
                .filter_map(|builder| builder.ok())
                .collect();

            if !cookies.is_empty() {
                page.set_cookies(cookies)
                    .await
                    .map_err(|e| Error::Browser(e.to_string()))?;
            }
        }

        if !request.headers.is_empty() {
            let headers: serde_json::Map<String, serde_json::Value> = request
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(serde_json::Value::Object(headers))))
                .await
                .map_err(|e| Error::Browser(e.to_string()))?;
        }

        Ok(())
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.fetch_inner(request).await
    }
}
