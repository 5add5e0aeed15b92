//! Metadata store model shared by the tsdb server and restore client.
//!
//! Organizations, buckets and the per-bucket shard catalog live in a single
//! SQLite file. The server owns it read-write; a backup carries a copy of it
//! which the restore client opens read-only.

pub mod catalog;
pub mod error;
pub mod id;
pub mod schema;
pub mod store;
pub mod tenant;

pub use catalog::{BucketCatalog, ShardGroupInfo, ShardIdMap, ShardInfo};
pub use error::{MetaError, Result};
pub use id::Id;
pub use store::MetaStore;
pub use tenant::{Bucket, BucketFilter, Organization, OrganizationFilter, INTERNAL_BUCKET_PREFIX};
