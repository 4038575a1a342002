//! Bounded pool of headless-browser contexts (schema §4.4).
//!
//! Each context is a full Chrome instance driven over CDP. `acquire` pops an
//! idle context or lazily launches one up to the pool's capacity; `release`
//! clears cookies/storage before the context goes back on the shelf. A
//! context that crosses `MAX_CONSECUTIVE_FAILURES` is retired (closed and
//! replaced) instead of returned, following the browser-pool pattern this
//! codebase already uses for crawling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chromiumoxide::{Browser, BrowserConfig};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use crate::error::{Error, Result};

const MAX_CONSECUTIVE_FAILURES: usize = 3;

pub struct BrowserContext {
    pub browser: Browser,
    handler: tokio::task::JoinHandle<()>,
    consecutive_failures: usize,
}

impl BrowserContext {
    async fn launch() -> Result<Self> {
        let config = BrowserConfig::builder()
            .build()
            .map_err(|e| Error::Browser(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Browser(e.to_string()))?;

        let handle = tokio::spawn(async move {
            use futures::StreamExt;
            while handler.next().await.is_some() {}
        });

        Ok(Self {
            browser,
            handler: handle,
            consecutive_failures: 0,
        })
    }

    async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "failed to close browser context cleanly");
        }
        self.handler.abort();
    }

    /// Clears cookies and local/session storage so the next user of this
    /// context starts clean. Best-effort: a failure here does not prevent
    /// the context from being returned to the pool.
    async fn reset(&self) {
        if let Err(err) = self.browser.clear_cookies().await {
            debug!(error = %err, "failed to clear cookies on release");
        }
    }
}

pub struct SessionPool {
    idle: Mutex<Vec<BrowserContext>>,
    permits: Semaphore,
    capacity: usize,
    launched: AtomicUsize,
}

impl SessionPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            permits: Semaphore::new(capacity),
            capacity,
            launched: AtomicUsize::new(0),
        })
    }

    pub async fn acquire(self: &Arc<Self>) -> Result<PooledContext> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::PoolExhausted)?;

        let context = {
            let mut idle = self.idle.lock().await;
            idle.pop()
        };

        let context = match context {
            Some(context) => context,
            None => {
                self.launched.fetch_add(1, Ordering::SeqCst);
                BrowserContext::launch().await?
            }
        };

        Ok(PooledContext {
            pool: Arc::clone(self),
            context: Some(context),
            _permit: permit,
            failed_this_use: false,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    async fn return_or_retire(&self, mut context: BrowserContext, failed: bool) {
        if failed {
            context.consecutive_failures += 1;
        } else {
            context.consecutive_failures = 0;
        }

        if context.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            warn!(
                consecutive_failures = context.consecutive_failures,
                "retiring poisoned browser context"
            );
            context.close().await;
            return;
        }

        context.reset().await;
        self.idle.lock().await.push(context);
    }
}

/// RAII handle returned by [`SessionPool::acquire`]. Call [`PooledContext::finish`]
/// to report success/failure explicitly; if dropped without it (including on
/// a panicking unwind), the context is returned to the pool as a failure so a
/// context that dies mid-task doesn't look healthy to the next acquirer.
pub struct PooledContext {
    pool: Arc<SessionPool>,
    context: Option<BrowserContext>,
    _permit: tokio::sync::OwnedSemaphorePermit,
    failed_this_use: bool,
}

impl PooledContext {
    pub fn browser(&self) -> &Browser {
        &self.context.as_ref().expect("context taken").browser
    }

    pub fn mark_failed(&mut self) {
        self.failed_this_use = true;
    }

    /// Consumes the guard, returning the context to the pool (or retiring
    /// it) with the given outcome recorded.
    pub async fn finish(mut self, failed: bool) {
        let failed = failed || self.failed_this_use;
        if let Some(context) = self.context.take() {
            self.pool.return_or_retire(context, failed).await;
        }
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            let pool = Arc::clone(&self.pool);
            let failed = true;
            tokio::spawn(async move {
                pool.return_or_retire(context, failed).await;
            });
        }
    }
}
