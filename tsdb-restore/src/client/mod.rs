//! Services the restore client consumes from a running server.
//!
//! The executors only see these traits; [`http::HttpClient`] implements all
//! of them against the server's HTTP API.

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use tsdb_meta::{Bucket, Id, Organization, ShardIdMap};

use crate::utils::Result;

pub use http::HttpClient;

/// A byte stream sent as a request body.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Restore endpoints of the server.
#[async_trait]
pub trait RestoreService: Send + Sync {
    /// Replace the server's entire metadata store with `snapshot`.
    async fn replace_metadata_store(&self, snapshot: ByteStream) -> Result<()>;

    /// Create shard catalog entries in `bucket_id` from a serialized
    /// [`tsdb_meta::BucketCatalog`], returning backup → server shard IDs.
    async fn create_shard_catalog(&self, bucket_id: Id, catalog: Vec<u8>) -> Result<ShardIdMap>;

    /// Replace the data of `shard_id` with the decompressed archive `data`.
    async fn restore_shard(&self, shard_id: u64, data: ByteStream) -> Result<()>;
}

#[async_trait]
pub trait OrganizationService: Send + Sync {
    async fn find_organization_by_name(&self, name: &str) -> Result<Option<Organization>>;

    /// Create an organization. The server assigns its ID.
    async fn create_organization(&self, org: &Organization) -> Result<Organization>;
}

#[async_trait]
pub trait BucketService: Send + Sync {
    /// Create a bucket. The server assigns its ID; a bucket with the same
    /// name in the same organization is an error.
    async fn create_bucket(&self, bucket: &Bucket) -> Result<Bucket>;
}
