//! Rate-limited fetcher wrapper, generalizing the rate-limiting decorator
//! this codebase already uses around its crawlers to any [`Fetcher`].

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};

use crate::error::Result;
use crate::types::{FetchRequest, FetchResponse, Fetcher};

type DefaultRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// Wraps a [`Fetcher`] so every call waits for a token before proceeding.
pub struct RateLimitedFetcher<F: Fetcher> {
    inner: F,
    limiter: Arc<DefaultRateLimiter>,
}

impl<F: Fetcher> RateLimitedFetcher<F> {
    pub fn new(fetcher: F, requests_per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).expect("requests_per_second must be > 0"));
        Self {
            inner: fetcher,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn with_burst(fetcher: F, requests_per_second: u32, burst: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).expect("requests_per_second must be > 0"))
            .allow_burst(NonZeroU32::new(burst).expect("burst must be > 0"));
        Self {
            inner: fetcher,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for RateLimitedFetcher<F> {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.limiter.until_ready().await;
        self.inner.fetch(request).await
    }
}

/// Extension trait mirroring the ergonomic `.rate_limited(n)` helper used
/// elsewhere in this codebase's crawling layer.
pub trait FetcherExt: Fetcher + Sized {
    fn rate_limited(self, requests_per_second: u32) -> RateLimitedFetcher<Self> {
        RateLimitedFetcher::new(self, requests_per_second)
    }

    fn rate_limited_with_burst(self, requests_per_second: u32, burst: u32) -> RateLimitedFetcher<Self> {
        RateLimitedFetcher::with_burst(self, requests_per_second, burst)
    }
}

impl<F: Fetcher + Sized> FetcherExt for F {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpFetcher;

    #[test]
    fn rate_limited_wraps_without_panicking() {
        let fetcher = HttpFetcher::new().rate_limited(5);
        let _ = fetcher;
    }
}
