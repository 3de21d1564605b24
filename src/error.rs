use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("corruption detected: {0}")]
    Corruption(String),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("serialization conflict: concurrent transaction wrote the same record")]
    Serialization,
    #[error("record deleted in this transaction")]
    RecordDeleted,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("query cancelled")]
    Cancelled,
    #[error("recovery failed: {0}")]
    Recovery(String),
    #[error("kvstore error: {0}")]
    KvStore(String),
}

impl GraphError {
    /// True for errors that abort the current transaction but leave the
    /// server serving; recovery errors escalate instead.
    pub fn aborts_transaction(&self) -> bool {
        !matches!(self, GraphError::Recovery(_))
    }
}
