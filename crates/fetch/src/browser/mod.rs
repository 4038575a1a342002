mod fetcher;
mod navigation;
mod pool;
mod stealth;

pub use fetcher::BrowserFetcher;
pub use pool::{PooledContext, SessionPool};
