use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("failed to (de)serialize envelope: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("consumer channel closed unexpectedly")]
    ConsumerClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
