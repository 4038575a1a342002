use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
