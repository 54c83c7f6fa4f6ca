//! History persistence error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HistoryError>;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("History record not found: {0}")]
    NotFound(String),

    #[error("Unknown history type: {0}")]
    UnknownType(String),
}
