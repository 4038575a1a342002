use uuid::Uuid;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("task {0} not found")]
    TaskNotFound(Uuid),
    #[error("schema {0} not found")]
    SchemaNotFound(Uuid),
    #[error("invalid transition: task {task_id} is {from:?}, cannot {action}")]
    InvalidTransition { task_id: Uuid, from: crate::task::TaskStatus, action: &'static str },
    #[error("bus error: {0}")]
    Bus(#[from] bus::Error),
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
