//! HTTP-mode fetcher (schema §4.3): a single validated GET with merged
//! headers, optional proxy, redirects followed, and a per-request timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{FetchRequest, FetchResponse, Fetcher};
use crate::validator::UrlValidator;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_USER_AGENT: &str = "ParserBot/1.0";

pub struct HttpFetcher {
    client: reqwest::Client,
    validator: UrlValidator,
    user_agent: String,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::limited(10))
                .build()
                .expect("failed to build reqwest client"),
            validator: UrlValidator::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_validator(mut self, validator: UrlValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.validator.validate_with_dns(&request.url).await?;

        let timeout = Duration::from_secs(request.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let started = Instant::now();

        debug!(url = %request.url, "http fetch starting");

        let client = if let Some(proxy_url) = &request.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(Error::Http)?;
            reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::limited(10))
                .proxy(proxy)
                .build()
                .map_err(Error::Http)?
        } else {
            self.client.clone()
        };

        let mut builder = client
            .get(&request.url)
            .timeout(timeout)
            .header("User-Agent", &self.user_agent);

        // Schema headers first, task headers override (schema §4.3).
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        if !request.cookies.is_empty() {
            let cookie_header = request
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header("Cookie", cookie_header);
        }

        let response = builder.send().await.map_err(|err| {
            warn!(url = %request.url, error = %err, "http request failed");
            if err.is_timeout() {
                Error::Timeout { url: request.url.clone() }
            } else {
                Error::Http(err)
            }
        })?;

        let status = response.status();
        let final_url = response.url().to_string();

        let mut response_headers: HashMap<String, String> = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                response_headers.insert(key.as_str().to_string(), value.to_string());
            }
        }

        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(Error::Http)?;
        let duration_ms = started.elapsed().as_millis() as u64;
        let bytes_downloaded = body.len() as u64;

        debug!(
            url = %request.url,
            status = status.as_u16(),
            bytes = bytes_downloaded,
            duration_ms,
            "http fetch complete"
        );

        Ok(FetchResponse {
            html: body,
            status: status.as_u16(),
            final_url,
            headers: response_headers,
            duration_ms,
            bytes_downloaded,
            screenshot: None,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        HttpFetcher::fetch(self, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_successful_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalog"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new();
        let request = FetchRequest {
            timeout_seconds: Some(5),
            ..FetchRequest::new(format!("{}/catalog", server.uri()))
        };

        let response = fetcher.fetch(&request).await.unwrap();
        assert_eq!(response.status, 200);
        assert!(response.html.contains("hi"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new();
        let request = FetchRequest {
            timeout_seconds: Some(5),
            ..FetchRequest::new(format!("{}/missing", server.uri()))
        };

        let err = fetcher.fetch(&request).await.unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn rejects_ssrf_targets_before_sending() {
        let fetcher = HttpFetcher::new();
        let request = FetchRequest {
            timeout_seconds: Some(5),
            ..FetchRequest::new("http://169.254.169.254/latest/meta-data/")
        };

        let err = fetcher.fetch(&request).await.unwrap_err();
        assert!(matches!(err, Error::Security(_)));
    }
}
