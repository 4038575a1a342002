use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("url does not parse: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("url has no host")]
    NoHost,
    #[error("disallowed scheme: {0}")]
    DisallowedScheme(String),
    #[error("blocked host: {0}")]
    BlockedHost(String),
    #[error("blocked cidr: {0}")]
    BlockedCidr(String),
    #[error("dns resolution failed: {0}")]
    DnsResolution(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("security: {0}")]
    Security(#[from] SecurityError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("http status {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },
    #[error("timed out fetching {url}")]
    Timeout { url: String },
    #[error("browser error: {0}")]
    Browser(String),
    #[error("navigation step failed: {0}")]
    NavigationStep(String),
    #[error("session pool exhausted")]
    PoolExhausted,
}

impl Error {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Timeout { .. } | Error::Browser(_) | Error::PoolExhausted
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
pub type SecurityResult<T> = std::result::Result<T, SecurityError>;
