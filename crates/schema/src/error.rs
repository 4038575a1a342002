use thiserror::Error;

/// Errors raised while constructing or validating a [`crate::ParsingSchema`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("duplicate field name: {0}")]
    DuplicateField(String),

    #[error("dedup key '{0}' does not name a field on this schema")]
    UnknownDedupKey(String),

    #[error("field '{field}' has an invalid selector: {source}")]
    InvalidSelector {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("schema has no fields")]
    NoFields,

    #[error("pagination rule of type '{0}' is missing a required attribute: {1}")]
    InvalidPagination(&'static str, &'static str),

    #[error("invalid semantic version: {0}")]
    InvalidVersion(String),
}

pub type Result<T> = std::result::Result<T, Error>;
