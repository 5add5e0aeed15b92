//! Custom error types for the restore client.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metadata store error: {0}")]
    Meta(#[from] tsdb_meta::MetaError),

    #[error("read manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no manifest files found in: {}", .0.display())]
    NoManifest(PathBuf),

    #[error("no metadata snapshot found in manifests under: {}", .0.display())]
    NoMetadataSnapshot(PathBuf),

    #[error("{0} not found")]
    NotFound(String),

    #[error("unsupported shard archive format: {}", .0.display())]
    UnsupportedArchive(PathBuf),

    #[error("remote server returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<RestoreError>,
    },

    #[error("Restore cancelled")]
    Cancelled,
}

impl RestoreError {
    /// Wrap this error with the name of the operation that failed.
    pub fn context(self, context: impl Into<String>) -> Self {
        RestoreError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, unwrapping any context layers.
    pub fn root(&self) -> &RestoreError {
        match self {
            RestoreError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Adds an operation name to the error of a fallible call.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<RestoreError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: RestoreError = e.into();
            err.context(context)
        })
    }
}

pub type Result<T> = std::result::Result<T, RestoreError>;
