//! Error types for metadata store access.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid ID: {0}")]
    InvalidId(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not a metadata store: {0}")]
    InvalidStore(String),
}

pub type Result<T> = std::result::Result<T, MetaError>;
