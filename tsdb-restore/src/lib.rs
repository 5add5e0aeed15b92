//! Restore client library
//!
//! Rebuilds a tsdb server's state from a backup directory: a set of
//! incremental manifests, a metadata snapshot and compressed shard archives.

pub mod client;
pub mod config;
pub mod manifest;
pub mod restore;
pub mod shutdown;
pub mod transfer;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use client::HttpClient;
pub use config::ClientConfig;
pub use manifest::{load_incremental, RestorePlan};
pub use restore::{run, RestoreOptions, Services, UnmappedShardPolicy};
pub use utils::errors::RestoreError;
pub type Result<T> = std::result::Result<T, RestoreError>;
