use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("fetch error: {0}")]
    Fetch(#[from] fetch::Error),
    #[error("extraction error: {0}")]
    Extract(#[from] extract::Error),
    #[error("storage error: {0}")]
    Storage(#[from] storage::Error),
    #[error("bus error: {0}")]
    Bus(#[from] bus::Error),
    #[error("coordinator error: {0}")]
    Coordinator(#[from] coordinator::Error),
    #[error("schema not found: {schema_id} (version {version:?})")]
    SchemaNotFound { schema_id: uuid::Uuid, version: Option<u32> },
    #[error("malformed task message: {0}")]
    MalformedMessage(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
